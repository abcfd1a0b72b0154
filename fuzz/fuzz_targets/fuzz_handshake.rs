#![no_main]

use bytes::Bytes;
use cluster_link::core::binary::PayloadReader;
use cluster_link::protocol::handshake::Handshake;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut reader = PayloadReader::new(Bytes::copy_from_slice(data));
    if let Ok(handshake) = Handshake::read_from(&mut reader) {
        // Anything we accept must survive our own encoder
        let message = handshake.to_message();
        let mut again = PayloadReader::new(Bytes::copy_from_slice(message.payload()));
        let _ = Handshake::read_from(&mut again);
    }
});
