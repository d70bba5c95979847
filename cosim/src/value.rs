// Copyright 2023 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Width-aware helpers over the opaque unsigned value type.
//!
//! Channel values are `num::BigUint`: ports routinely carry widths that no
//! machine-native integer covers, and the driver only ever needs masking,
//! comparison and hex formatting on top of that.

use num::bigint::BigUint;
use num::One;

/// All-ones mask for a port of the given bit width.
pub fn mask(width: usize) -> BigUint {
    (BigUint::one() << width) - BigUint::one()
}

/// Truncates `value` to `width` bits, the way hardware drops high-order
/// bits of an over-wide write.
pub fn truncate(value: &BigUint, width: usize) -> BigUint {
    value & &mask(width)
}

/// Whether `value` is representable in `width` bits.
pub fn fits(value: &BigUint, width: usize) -> bool {
    value.bits() <= width as u64
}

/// Hex rendering used by the dump file and diagnostics.
pub fn to_hex(value: &BigUint) -> String {
    format!("0x{:x}", value)
}
