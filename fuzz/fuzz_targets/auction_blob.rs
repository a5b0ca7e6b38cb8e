#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(auction) = eponym_namestate::Auction::deserialize(data) else {
        return;
    };
    // Accepted blobs must round-trip byte-for-byte.
    let enc = auction.serialize();
    if enc != data {
        panic!("auction blob not canonical");
    }
});
