// SPDX-License-Identifier: PMPL-1.0-or-later
// Fuzz target for segment descriptor parsing

#![no_main]

use libfuzzer_sys::fuzz_target;
use verisim_journal::Descriptor;

fuzz_target!(|data: &[u8]| {
    // Anything that parses must serialize back to the same fields. Bytes
    // past `updated` are reserved and written as zeros.
    if let Ok(descriptor) = Descriptor::parse(data) {
        let bytes = descriptor.to_bytes();
        assert_eq!(&bytes[..40], &data[..40]);
        assert_eq!(Descriptor::parse(&bytes).ok(), Some(descriptor));
    }
});
