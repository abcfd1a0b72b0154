#![no_main]

use bytes::BytesMut;
use cluster_link::core::codec::LinkCodec;
use libfuzzer_sys::fuzz_target;
use tokio_util::codec::Decoder;

fuzz_target!(|data: &[u8]| {
    // Arbitrary wire bytes, delivered in two chunks at a data-driven split point
    let Some((&split, data)) = data.split_first() else {
        return;
    };
    let split = (split as usize).min(data.len());
    let mut codec = LinkCodec::new(64 * 1024);
    let mut buf = BytesMut::from(&data[..split]);

    for chunk in [&data[split..], &[][..]] {
        loop {
            match codec.decode(&mut buf) {
                Ok(Some(frame)) => {
                    let _ = frame.reader().read_string8();
                }
                Ok(None) => break,
                Err(_) => return,
            }
        }
        buf.extend_from_slice(chunk);
    }
});
