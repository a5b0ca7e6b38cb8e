#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok((n, nbytes)) = eponym_consensus::compact_size_decode(data) else {
        return;
    };
    let enc = eponym_consensus::compact_size_encode(n);
    let prefix = &data[..nbytes];
    if enc != prefix {
        panic!("non-minimal or mismatch: got={enc:02x?} want_prefix={prefix:02x?}");
    }
});
