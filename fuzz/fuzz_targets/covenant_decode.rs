#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok((cov, used)) = eponym_consensus::covenant_decode(data) else {
        return;
    };
    // Whatever decodes must re-encode to the exact consumed prefix.
    let enc = eponym_consensus::covenant_encode(&cov);
    if enc != &data[..used] {
        panic!("covenant not canonical: got={enc:02x?} want={:02x?}", &data[..used]);
    }
});
