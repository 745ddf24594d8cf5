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

//! The `fsck` tool verifies the consistency of a mapfs filesystem image.

use mapfs::check::check;
use mapfs::error;
use mapfs::util::ByteSize;
use mapfs::MapFs;
use std::env::ArgsOs;
use std::path::PathBuf;
use std::process::exit;
use uuid::Uuid;

/// Structure storing command line arguments.
#[derive(Default)]
struct Args {
    /// If true, print command line help.
    help: bool,
    /// The path to the image file to check.
    image_path: Option<PathBuf>,
}

fn parse_args(args: ArgsOs) -> Args {
    let mut res: Args = Default::default();
    for arg in args {
        match arg.to_str() {
            Some("-h" | "--help") => res.help = true,
            _ => res.image_path = Some(PathBuf::from(arg)),
        }
    }
    res
}

/// Prints the command's usage.
fn print_usage() {
    eprintln!("Usage:");
    eprintln!(" fsck.mapfs image");
    eprintln!();
    eprintln!("Options:");
    eprintln!(" -h:\t\tprints usage");
    eprintln!(" image:\tthe filesystem image to check");
}

pub fn main(args: ArgsOs) {
    let args = parse_args(args);
    if args.help {
        print_usage();
        return;
    }
    let image_path = args.image_path.unwrap_or_else(|| {
        error("fsck.mapfs", "specify path to an image");
    });

    let fs = MapFs::open(&image_path).unwrap_or_else(|e| {
        error("fsck.mapfs", format_args!("{}: {e}", image_path.display()));
    });
    let st = fs.statfs();
    println!(
        "{}: {} blocks ({}), {} inodes, volume id {}",
        image_path.display(),
        st.total_blocks,
        ByteSize(st.total_blocks * st.block_size as u64),
        st.total_inodes,
        Uuid::from_bytes(fs.volume_id())
    );

    let report = check(&fs);
    println!(
        "{} inodes and {} data blocks in use",
        report.inodes_used, report.blocks_used
    );
    for err in &report.errors {
        eprintln!("{}: {err}", image_path.display());
    }
    if !report.is_clean() {
        exit(1);
    }
    println!("clean");
}
