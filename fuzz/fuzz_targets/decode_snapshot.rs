//! Fuzz snapshot decoding: arbitrary bytes must never panic the decoder.
//! Anything that decodes must carry the supported format and convert into
//! a catalog.

#![no_main]

use libfuzzer_sys::fuzz_target;
use pdq_core::cache::CatalogSnapshot;

fuzz_target!(|data: &[u8]| {
    if let Ok(snapshot) = CatalogSnapshot::decode(data) {
        let records = snapshot.len();
        let catalog = snapshot.into_catalog();
        assert_eq!(catalog.len(), records);
    }
});
