//! Jitter buffers (spec.md §4.9–§4.10 / C9–C10): one reassembly/ordering
//! strategy per media type, each built on the shared
//! [`ims_rtp_core::analyser::JitterNetworkAnalyser`] where depth adaptation
//! applies.

pub mod audio;
pub mod text;
pub mod video;

pub use audio::AudioJitterBuffer;
pub use text::TextJitterBuffer;
pub use video::VideoJitterBuffer;
