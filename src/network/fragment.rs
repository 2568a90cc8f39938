//! IPv4 fragment reassembly
//!
//! Fragments are buffered per (source address, identification) and released
//! as one payload once the final fragment has fixed the datagram length and
//! the pieces cover it without gaps. Incomplete sets are bounded in number and
//! expire after a timeout so a peer that never finishes a datagram cannot pin
//! memory.

use std::collections::{BTreeMap, HashMap};
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

use log::debug;

use crate::network::ipv4::{flags, Ipv4Header, IPV4_HEADER_LEN, MAX_PAYLOAD_LEN};

/// Limits applied to incomplete datagrams
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReassemblyConfig {
    /// Maximum number of datagrams being reassembled at once
    pub max_pending: usize,
    /// Lifetime of an incomplete datagram, counted from its first fragment
    pub timeout: Duration,
}

impl Default for ReassemblyConfig {
    fn default() -> Self {
        ReassemblyConfig {
            max_pending: 16,
            timeout: Duration::from_secs(30),
        }
    }
}

type FragmentKey = (Ipv4Addr, u16);

#[derive(Debug)]
struct FragmentSet {
    /// byte offset -> fragment payload
    pieces: BTreeMap<usize, Vec<u8>>,
    /// Known once the fragment with MF clear arrives
    total_len: Option<usize>,
    /// Header of the offset-0 fragment
    first_header: Option<Ipv4Header>,
    created: Instant,
}

impl FragmentSet {
    fn new(now: Instant) -> Self {
        FragmentSet {
            pieces: BTreeMap::new(),
            total_len: None,
            first_header: None,
            created: now,
        }
    }

    /// Insert a piece. Returns false if it disagrees with held data.
    ///
    /// Bytes already held are compared and skipped; only the uncovered
    /// ranges of `data` are stored, so pieces never overlap.
    fn insert(&mut self, offset: usize, data: &[u8]) -> bool {
        let end = offset + data.len();
        let first = self
            .pieces
            .range(..offset)
            .next_back()
            .map_or(offset, |(&piece_offset, _)| piece_offset);

        let mut gaps = Vec::new();
        let mut cursor = offset;
        for (&piece_offset, piece) in self.pieces.range(first..end) {
            let piece_end = piece_offset + piece.len();
            if piece_end <= cursor {
                continue;
            }
            if piece_offset > cursor {
                gaps.push((cursor, piece_offset));
            }
            let lo = piece_offset.max(offset);
            let hi = piece_end.min(end);
            if piece[lo - piece_offset..hi - piece_offset] != data[lo - offset..hi - offset] {
                return false;
            }
            cursor = hi;
        }
        if cursor < end {
            gaps.push((cursor, end));
        }

        for (lo, hi) in gaps {
            self.pieces.insert(lo, data[lo - offset..hi - offset].to_vec());
        }
        true
    }

    /// Total length if the held pieces cover `[0, total)` exactly
    fn complete_len(&self) -> Option<usize> {
        let total = self.total_len?;
        let mut cursor = 0;
        for (&offset, data) in &self.pieces {
            if offset != cursor {
                return None;
            }
            cursor += data.len();
        }
        (cursor == total).then_some(total)
    }
}

/// Reassembly state owned by one interface
#[derive(Debug, Default)]
pub struct Reassembler {
    config: ReassemblyConfig,
    sets: HashMap<FragmentKey, FragmentSet>,
}

impl Reassembler {
    pub fn new(config: ReassemblyConfig) -> Self {
        Reassembler {
            config,
            sets: HashMap::new(),
        }
    }

    /// Number of datagrams currently waiting for fragments
    pub fn pending(&self) -> usize {
        self.sets.len()
    }

    /// Add one fragment.
    ///
    /// `header` is the validated header of the fragment and `payload` its
    /// data with the IP header removed. Returns the rebuilt header and the
    /// full payload once the datagram is complete.
    pub fn add_fragment(
        &mut self,
        header: &Ipv4Header,
        payload: &[u8],
        now: Instant,
    ) -> Option<(Ipv4Header, Vec<u8>)> {
        let offset = header.fragment_offset();
        let end = offset + payload.len();
        let more_fragments = header.more_fragments();

        if more_fragments && payload.len() % 8 != 0 {
            debug!(
                "dropping fragment id={} from {}: length {} not a multiple of 8",
                header.id,
                header.src_addr,
                payload.len()
            );
            return None;
        }
        if end > MAX_PAYLOAD_LEN {
            debug!(
                "dropping fragment id={} from {}: ends at {}",
                header.id, header.src_addr, end
            );
            return None;
        }

        let key = (header.src_addr, header.id);
        if !self.sets.contains_key(&key) {
            self.make_room();
        }
        let set = self
            .sets
            .entry(key)
            .or_insert_with(|| FragmentSet::new(now));

        if !more_fragments {
            if set.total_len.is_some_and(|total| total != end) {
                debug!(
                    "discarding datagram id={} from {}: conflicting final fragments",
                    header.id, header.src_addr
                );
                self.sets.remove(&key);
                return None;
            }
            set.total_len = Some(end);
        }
        if set.total_len.is_some_and(|total| end > total) {
            debug!(
                "discarding datagram id={} from {}: fragment past final length",
                header.id, header.src_addr
            );
            self.sets.remove(&key);
            return None;
        }

        if !set.insert(offset, payload) {
            debug!(
                "discarding datagram id={} from {}: overlapping fragments",
                header.id, header.src_addr
            );
            self.sets.remove(&key);
            return None;
        }
        if offset == 0 {
            set.first_header = Some(header.clone());
        }

        let total = set.complete_len()?;
        let set = self.sets.remove(&key)?;
        let mut datagram = Vec::with_capacity(total);
        for data in set.pieces.values() {
            datagram.extend_from_slice(data);
        }

        let mut header = set.first_header.unwrap_or_else(|| header.clone());
        header.flags_frag_offset &= flags::DONT_FRAGMENT;
        header.total_len = (IPV4_HEADER_LEN + total) as u16;
        header.update_checksum();

        debug!(
            "reassembled datagram id={} from {} ({} bytes)",
            header.id, header.src_addr, total
        );
        Some((header, datagram))
    }

    /// Drop incomplete datagrams older than the timeout
    pub fn purge_expired(&mut self, now: Instant) -> usize {
        let timeout = self.config.timeout;
        let before = self.sets.len();
        self.sets
            .retain(|_, set| now.saturating_duration_since(set.created) < timeout);
        let purged = before - self.sets.len();
        if purged > 0 {
            debug!("purged {} expired reassembly sets", purged);
        }
        purged
    }

    /// Evict the oldest set until a new one fits
    fn make_room(&mut self) {
        while self.sets.len() >= self.config.max_pending.max(1) {
            let oldest = self
                .sets
                .iter()
                .min_by_key(|(_, set)| set.created)
                .map(|(key, _)| *key);
            match oldest {
                Some(key) => {
                    debug!("evicting reassembly set id={} from {}", key.1, key.0);
                    self.sets.remove(&key);
                }
                None => break,
            }
        }
    }
}
