use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use ims_media_core::config::AudioPayloadConfig;
use ims_media_core::descriptor::{MediaSubtype, PacketDescriptor};
use ims_media_core::error::Error;
use ims_media_core::node::Node;
use ims_media_core::nodes::{AudioPayloadDecoderNode, AudioPayloadEncoderNode};
use ims_media_core::scheduler::StreamScheduler;
use ims_media_core::session::{Parcel, SessionManager};

/// An AMR frame type 7 (12.2 kbit/s) raw frame round-trips through the
/// encoder/decoder node pair unchanged, the way an audio graph's
/// `PayloadEncoder -> ... -> PayloadDecoder` legs would over a loopback.
#[tokio::test(flavor = "current_thread")]
async fn amr_frame_round_trips_through_payload_nodes() {
    let scheduler = Arc::new(StreamScheduler::new());
    let config = AudioPayloadConfig::default();

    let encoder = AudioPayloadEncoderNode::new("test-encoder", config);
    let encoder_input = encoder.base().input_queue();

    let decoder = AudioPayloadDecoderNode::new("test-decoder", config);
    encoder.base().connect_rear(decoder.base().input_queue());
    let decoded = Arc::new(ims_rtp_core::queue::DataQueue::new());
    decoder.base().connect_rear(decoded.clone());

    scheduler.register_node(Box::new(encoder));
    scheduler.register_node(Box::new(decoder));

    let raw = Bytes::from(vec![0x42u8; 31]); // AMR frame type 7: 244 bits = 31 bytes.
    let mut desc = PacketDescriptor::new(raw.clone(), MediaSubtype::RawMedia);
    desc.rtp_timestamp = 1600;
    encoder_input.add(desc);

    scheduler.start().unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    scheduler.stop().await;

    let out = decoded.get().expect("decoded frame should have arrived");
    assert_eq!(out.data, raw);
    assert_eq!(out.rtp_timestamp, 1600);
}

#[test]
fn dispatching_a_parcel_to_an_unknown_session_errors() {
    let manager = SessionManager::new();
    let parcel = Parcel { tag: 1, payload: vec![b'5', 0, 0, 0, 100] };
    let err = manager.dispatch_parcel(999, parcel).unwrap_err();
    assert!(matches!(err, Error::UnknownSession(999)));
}

#[test]
fn creating_and_closing_a_session_round_trips_through_the_manager() {
    let manager = SessionManager::new();
    let session = manager.create_session("alice@example.com");
    assert_eq!(manager.session_count(), 1);

    manager.close_session(session.id()).unwrap();
    assert_eq!(manager.session_count(), 0);
}
