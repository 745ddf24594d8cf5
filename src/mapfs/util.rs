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

//! This module implements utility functions.

use std::fmt;
use std::mem::size_of;
use std::ops::Add;
use std::ops::Div;
use std::ops::Rem;
use std::slice;
use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

/// Returns the ceiling of the division of `n0` by `n1`.
pub fn ceil_division<T>(n0: T, n1: T) -> T
where
    T: Add<Output = T> + Copy + Div<Output = T> + From<u8> + PartialEq + Rem<Output = T>,
{
    if (n0 % n1) != T::from(0) {
        (n0 / n1) + T::from(1)
    } else {
        n0 / n1
    }
}

/// Returns the current timestamp since the Unix epoch.
pub fn get_timestamp() -> Duration {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("System clock panic!")
}

/// Reinterprets the given object as a slice of bytes.
pub fn reinterpret<T>(obj: &T) -> &[u8] {
    unsafe { slice::from_raw_parts(obj as *const _ as *const u8, size_of::<T>()) }
}

/// Performs the log2 operation on the given integer.
///
/// If the result is undefined, the function returns None.
pub fn log2(n: u64) -> Option<u64> {
    let num_bits = (size_of::<u64>() * 8) as u64;

    let n = num_bits - n.leading_zeros() as u64;
    if n > 0 {
        Some(n - 1)
    } else {
        None
    }
}

/// Structure representing a number of bytes.
pub struct ByteSize(pub u64);

impl fmt::Display for ByteSize {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut order = log2(self.0).unwrap_or(0) / log2(1024).unwrap();

        let suffix = match order {
            0 => "bytes",
            1 => "KiB",
            2 => "MiB",
            3 => "GiB",
            4 => "TiB",
            5 => "PiB",
            6 => "EiB",
            7 => "ZiB",
            8 => "YiB",

            _ => {
                order = 0;
                "bytes"
            }
        };

        let unit = 1024usize.pow(order as u32);
        let nbr = self.0 / unit as u64;

        write!(fmt, "{} {}", nbr, suffix)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn ceil_div() {
        assert_eq!(ceil_division(0u64, 4096), 0);
        assert_eq!(ceil_division(1u64, 4096), 1);
        assert_eq!(ceil_division(4096u64, 4096), 1);
        assert_eq!(ceil_division(4097u64, 4096), 2);
        assert_eq!(ceil_division(10000u64, 4096), 3);
    }

    #[test]
    fn bytesize() {
        assert_eq!(format!("{}", ByteSize(0)).as_str(), "0 bytes");
        assert_eq!(format!("{}", ByteSize(1023)).as_str(), "1023 bytes");
        assert_eq!(format!("{}", ByteSize(1024)).as_str(), "1 KiB");
        assert_eq!(format!("{}", ByteSize(1024 * 1024)).as_str(), "1 MiB");
    }
}
