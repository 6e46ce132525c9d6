//! Fuzz FMRI parsing: arbitrary text must either parse into an FMRI that
//! round-trips through Display, or fail cleanly.

#![no_main]

use libfuzzer_sys::fuzz_target;
use pdq_core::Fmri;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(fmri) = text.parse::<Fmri>() {
        let rendered = fmri.to_string();
        let reparsed: Fmri = rendered.parse().expect("rendered FMRI must reparse");
        assert_eq!(fmri, reparsed);
    }
});
