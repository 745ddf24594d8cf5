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

//! Main of the mapfs utilities.
//!
//! The binary is multi-call: it behaves as `mkfs.mapfs` or `fsck.mapfs`
//! depending on the name it is invoked under, or takes the tool name as its
//! first argument.

mod fsck;
mod mkfs;

use mapfs::args;
use mapfs::error;

fn main() {
    env_logger::init();
    let (bin, mut args) = args();
    match bin.as_str() {
        "mkfs.mapfs" | "mkfs" => mkfs::main(args),
        "fsck.mapfs" | "fsck" => fsck::main(args),
        "mapfs" => {
            let applet = args.next().and_then(|s| s.into_string().ok());
            match applet.as_deref() {
                Some("mkfs") => mkfs::main(args),
                Some("fsck") => fsck::main(args),
                _ => error("mapfs", "usage: mapfs <mkfs | fsck> [options...]"),
            }
        }
        _ => error("mapfs", "invalid binary name"),
    }
}
