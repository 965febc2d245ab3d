#![no_main]

use libfuzzer_sys::fuzz_target;
use rustcec_core::encoding::writer::Writer;
use rustcec_core::message::MAX_FRAME_LEN;
use rustcec_core::CecMessage;

fuzz_target!(|data: &[u8]| {
    let Ok(message) = CecMessage::decode(data) else {
        return;
    };
    let mut buf = [0u8; MAX_FRAME_LEN];
    let mut w = Writer::new(&mut buf);
    if message.encode(&mut w).is_ok() {
        assert_eq!(w.as_written(), data);
    }
});
