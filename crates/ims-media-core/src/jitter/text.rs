//! T.140 text jitter buffer (spec.md §4.10 / C10): reassembles in sequence
//! order and recovers from loss using RFC 2198 redundant copies before
//! giving up and skipping ahead. RED block splitting (generation count,
//! per-block offsets) is a payload-format concern (C13); this module takes
//! the already-split primary block plus whichever redundant blocks were
//! carried alongside it and figures out which sequence number each belongs
//! to.

use std::collections::{BTreeMap, HashMap};

use bytes::Bytes;

use crate::config::TextJitterBufferConfig;

const T140_BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextBlock {
    pub sequence_number: u16,
    pub data: Bytes,
    /// Delivered from a redundant copy rather than its own primary packet.
    pub recovered: bool,
}

pub struct TextJitterBuffer {
    config: TextJitterBufferConfig,
    primary: BTreeMap<u16, Bytes>,
    redundant: HashMap<u16, Bytes>,
    expected_seq: Option<u16>,
    bom_seen: bool,
}

impl TextJitterBuffer {
    pub fn new(config: TextJitterBufferConfig) -> Self {
        Self { config, primary: BTreeMap::new(), redundant: HashMap::new(), expected_seq: None, bom_seen: false }
    }

    /// `redundant` carries `(sequence_number, data)` pairs for whatever
    /// earlier generations this packet repeats, per the RED payload header.
    pub fn add(&mut self, seq: u16, data: Bytes, redundant: Vec<(u16, Bytes)>) -> Vec<TextBlock> {
        if self.expected_seq.is_none() {
            self.expected_seq = Some(seq);
        }
        self.primary.insert(seq, data);
        for (rseq, rdata) in redundant {
            self.redundant.entry(rseq).or_insert(rdata);
        }
        self.drain()
    }

    fn strip_bom(&mut self, data: Bytes) -> Bytes {
        if data.starts_with(&T140_BOM) {
            if !self.bom_seen {
                self.bom_seen = true;
                return data.slice(T140_BOM.len()..);
            }
        }
        data
    }

    fn drain(&mut self) -> Vec<TextBlock> {
        let mut out = Vec::new();
        loop {
            let Some(expected) = self.expected_seq else { break };

            if let Some(data) = self.primary.remove(&expected) {
                self.redundant.remove(&expected);
                let data = self.strip_bom(data);
                out.push(TextBlock { sequence_number: expected, data, recovered: false });
                self.expected_seq = Some(expected.wrapping_add(1));
                continue;
            }

            if let Some(data) = self.redundant.remove(&expected) {
                let data = self.strip_bom(data);
                out.push(TextBlock { sequence_number: expected, data, recovered: true });
                self.expected_seq = Some(expected.wrapping_add(1));
                continue;
            }

            // Nothing for `expected` yet. Give RED a bounded window to
            // deliver it as a redundant copy before skipping ahead.
            let next_available = self.primary.keys().next().copied();
            if let Some(next) = next_available {
                let gap = next.wrapping_sub(expected);
                if gap as u32 > self.config.max_wait_packets {
                    self.expected_seq = Some(next);
                    continue;
                }
            }
            break;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_order_delivery_is_immediate() {
        let mut jb = TextJitterBuffer::new(TextJitterBufferConfig::default());
        let blocks = jb.add(0, Bytes::from_static(b"h"), vec![]);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].sequence_number, 0);
        assert!(!blocks[0].recovered);
    }

    #[test]
    fn missing_primary_is_recovered_from_redundant_copy() {
        let mut jb = TextJitterBuffer::new(TextJitterBufferConfig::default());
        jb.add(0, Bytes::from_static(b"h"), vec![]);
        // seq 1 lost entirely; seq 2 carries it as a redundant copy.
        let blocks = jb.add(2, Bytes::from_static(b"l"), vec![(1, Bytes::from_static(b"e"))]);

        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].sequence_number, 1);
        assert!(blocks[0].recovered);
        assert_eq!(blocks[1].sequence_number, 2);
        assert!(!blocks[1].recovered);
    }

    #[test]
    fn unrecoverable_gap_is_skipped_after_max_wait() {
        let mut jb = TextJitterBuffer::new(TextJitterBufferConfig { max_wait_packets: 1 });
        jb.add(0, Bytes::from_static(b"h"), vec![]);
        // seq 1 and 2 never show up in any redundant copy; seq 3 arrives.
        let blocks = jb.add(3, Bytes::from_static(b"x"), vec![]);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].sequence_number, 3);
    }

    #[test]
    fn leading_bom_is_stripped_later_ones_kept_as_zwnbsp() {
        let mut jb = TextJitterBuffer::new(TextJitterBufferConfig::default());
        let mut with_bom = Vec::from(T140_BOM);
        with_bom.extend_from_slice(b"hi");

        // First BOM is the session-start sync marker: stripped.
        let first = jb.add(0, Bytes::from(with_bom.clone()), vec![]);
        assert_eq!(&first[0].data[..], b"hi");

        // A later BOM is a real ZWNBSP character: kept.
        let second = jb.add(1, Bytes::from(with_bom.clone()), vec![]);
        assert_eq!(&second[0].data[..], &with_bom[..]);
    }
}
