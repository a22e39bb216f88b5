#![no_main]
use libfuzzer_sys::fuzz_target;
use listd_common::Mail;

fuzz_target!(|data: &[u8]| {
    let _ = std::str::from_utf8(data).map(Mail::parse);
});
