/*
 * Copyright 2025 Luc Lenôtre
 *
 * This file is part of Maestro.
 *
 * Maestro is free software: you can redistribute it and/or modify it under the
 * terms of the GNU General Public License as published by the Free Software
 * Foundation, either version 3 of the License, or (at your option) any later
 * version.
 *
 * Maestro is distributed in the hope that it will be useful, but WITHOUT ANY
 * WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR
 * A PARTICULAR PURPOSE. See the GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License along with
 * Maestro. If not, see <https://www.gnu.org/licenses/>.
 */

//! The `mkfs` tool allows to create a mapfs filesystem on a device or image
//! file.

use mapfs::error;
use mapfs::format::Formatter;
use mapfs::prompt::prompt;
use mapfs::util::ByteSize;
use std::env::ArgsOs;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process::exit;
use uuid::Uuid;

/// Structure storing command line arguments.
#[derive(Default)]
struct Args {
    /// If true, print command line help.
    help: bool,
    /// The number of inodes to create. Defaults to one per block.
    inodes: Option<u32>,
    /// The path to the device file on which the filesystem will be created.
    device_path: Option<PathBuf>,
}

fn parse_args(mut args: ArgsOs) -> Args {
    let mut res: Args = Default::default();
    while let Some(arg) = args.next() {
        match arg.to_str() {
            Some("-h" | "--help") => res.help = true,
            Some("-i" | "--inodes") => {
                let count = args
                    .next()
                    .and_then(|s| s.to_str().and_then(|s| s.parse().ok()));
                match count {
                    Some(count) => res.inodes = Some(count),
                    None => error("mkfs.mapfs", "-i requires an inode count"),
                }
            }
            _ => res.device_path = Some(PathBuf::from(arg)),
        }
    }
    res
}

/// Prints the command's usage.
fn print_usage() {
    eprintln!("Usage:");
    eprintln!(" mkfs.mapfs [-i inodes] device");
    eprintln!();
    eprintln!("Options:");
    eprintln!(" -h:\t\tprints usage");
    eprintln!(" -i inodes:\tnumber of inodes to create (default: one per block)");
    eprintln!(" device:\tthe device or image file to create the filesystem on");
}

pub fn main(args: ArgsOs) {
    let args = parse_args(args);
    if args.help {
        print_usage();
        return;
    }
    let device_path = args.device_path.unwrap_or_else(|| {
        error("mkfs.mapfs", "specify path to a device");
    });
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(&device_path)
        .unwrap_or_else(|e| {
            error("mkfs.mapfs", format_args!("{}: {e}", device_path.display()));
        });

    let present = Formatter::is_present(&mut file).unwrap_or_else(|e| {
        error("mkfs.mapfs", format_args!("{}: {e}", device_path.display()));
    });
    if present {
        println!(
            "{} already contains a mapfs filesystem",
            device_path.display()
        );
        let confirm = prompt("Proceed anyway? (y/N) ")
            .map(|s| s.to_lowercase() == "y")
            .unwrap_or(false);
        if !confirm {
            eprintln!("Abort.");
            exit(1);
        }
    }

    let factory = Formatter {
        inodes: args.inodes,
        ..Default::default()
    };
    let sb = factory.create(&mut file).unwrap_or_else(|e| {
        error(
            "mkfs.mapfs",
            format_args!("failed to create filesystem: {e}"),
        );
    });

    let total_blocks = sb.total_blocks as u64;
    let total_inodes = sb.total_inodes;
    let data_blocks = sb.data_blocks;
    let volume_id = sb.volume_id;
    println!(
        "created filesystem on {}: {total_blocks} blocks ({}), {data_blocks} data blocks, \
{total_inodes} inodes, volume id {}",
        device_path.display(),
        ByteSize(total_blocks * sb.block_size as u64),
        Uuid::from_bytes(volume_id)
    );
}
