//! Incremental IP/UDP checksum rewriting (C3), following RFC 1624.
//!
//! The accumulator is the same one's-complement update algebra the relay's
//! eBPF checksum module uses: `remove` an old 16/32-bit field, `add` the new
//! one, fold carries as you go, complement once at the end.

#[derive(Default, Clone, Copy)]
pub struct ChecksumUpdate {
    inner: u16,
}

impl ChecksumUpdate {
    pub fn new(checksum: u16) -> Self {
        Self { inner: !checksum }
    }

    pub fn remove_u16(self, val: u16) -> Self {
        self.ones_complement_add(!val)
    }

    pub fn remove_u32(self, val: u32) -> Self {
        self.remove_u16(fold_u32_into_u16(val))
    }

    pub fn add_u16(self, val: u16) -> Self {
        self.ones_complement_add(val)
    }

    pub fn add_u32(self, val: u32) -> Self {
        self.add_u16(fold_u32_into_u16(val))
    }

    fn ones_complement_add(self, val: u16) -> Self {
        let (res, carry) = self.inner.overflowing_add(val);
        Self {
            inner: res + (carry as u16),
        }
    }

    pub fn into_checksum(self) -> u16 {
        !self.inner
    }
}

fn fold_u32_into_u16(mut csum: u32) -> u16 {
    csum = (csum & 0xffff) + (csum >> 16);
    csum = (csum & 0xffff) + (csum >> 16);
    csum as u16
}

/// Folds a computed checksum of `0x0000` to `0xFFFF` as RFC 768 requires for
/// UDP (a wire value of `0x0000` instead means "no checksum"). The source
/// this switch is modeled on omits this fold; we don't reproduce that bug.
fn fold_udp_zero(checksum: u16) -> u16 {
    if checksum == 0 { 0xFFFF } else { checksum }
}

/// Result of rewriting one UDP-for-us packet's destination.
pub struct Rewrite {
    pub ip_checksum: u16,
    /// `None` means "leave the UDP checksum field as zero" (checksum was
    /// absent on ingress and stays absent on egress).
    pub udp_checksum: Option<u16>,
}

/// Computes the new IP and UDP checksums for rewriting a packet's
/// destination IP and UDP port in place.
///
/// `old_udp_checksum == 0` means the ingress packet carried no UDP
/// checksum; per RFC 768 that is preserved rather than computed.
pub fn rewrite_destination(
    old_ip_checksum: u16,
    old_udp_checksum: u16,
    old_dst_ip: [u8; 4],
    new_dst_ip: [u8; 4],
    old_dst_port: u16,
    new_dst_port: u16,
) -> Rewrite {
    let old_ip_u32 = u32::from_be_bytes(old_dst_ip);
    let new_ip_u32 = u32::from_be_bytes(new_dst_ip);

    let ip_checksum = ChecksumUpdate::new(old_ip_checksum)
        .remove_u32(old_ip_u32)
        .add_u32(new_ip_u32)
        .into_checksum();

    let udp_checksum = if old_udp_checksum == 0 {
        None
    } else {
        let computed = ChecksumUpdate::new(old_udp_checksum)
            .remove_u16(old_dst_port)
            .add_u16(new_dst_port)
            .remove_u32(old_ip_u32)
            .add_u32(new_ip_u32)
            .into_checksum();
        Some(fold_udp_zero(computed))
    };

    Rewrite {
        ip_checksum,
        udp_checksum,
    }
}

/// Computes a checksum from scratch over raw 16-bit big-endian words, used
/// only by tests to cross-check the incremental path (S2).
#[cfg(test)]
pub fn checksum_from_scratch(words: &[u16]) -> u16 {
    let mut acc = ChecksumUpdate::new(0xFFFF); // inner starts at 0
    for &w in words {
        acc = acc.add_u16(w);
    }
    acc.into_checksum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remove_then_add_same_value_is_identity() {
        let original = 0xABCDu16;
        let updated = ChecksumUpdate::new(original)
            .remove_u16(0x1234)
            .add_u16(0x1234)
            .into_checksum();
        assert_eq!(updated, original);
    }

    #[test]
    fn zero_udp_checksum_is_preserved_not_computed() {
        let r = rewrite_destination(0x4422, 0x0000, [0xAE, 0x24, 0x1E, 0x2B], [192, 168, 0, 1], 100, 200);
        assert_eq!(r.udp_checksum, None);
    }

    #[test]
    fn computed_zero_udp_checksum_folds_to_ffff() {
        // Construct inputs such that the incremental update nets to zero:
        // same port, same IP -- the update is a no-op, so a nonzero input
        // checksum stays nonzero. To hit the true zero-fold path we instead
        // verify the fold function directly, since contriving a genuine
        // zero-sum rewrite requires a full packet fixture (see S2/S3
        // integration coverage in `switch/tests/`).
        assert_eq!(fold_udp_zero(0x0000), 0xFFFF);
        assert_eq!(fold_udp_zero(0x1234), 0x1234);
    }

    #[test]
    fn ip_checksum_law_matches_from_scratch_recomputation() {
        // IPv4 header from S2: version/IHL/DSCP/len/id/flags/ttl/proto/csum/src/dst
        let words: [u16; 10] = [
            0x4500, 0x0030, 0x4422, 0x4000, 0x8006, 0x0000, 0x8C7C, 0x19AC, 0xAE24, 0x1E2B,
        ];
        let from_scratch_old = checksum_from_scratch(&words);

        let r = rewrite_destination(from_scratch_old, 0, [0xAE, 0x24, 0x1E, 0x2B], [0xC0, 0xA8, 0x00, 0x01], 0, 0);

        let mut new_words = words;
        new_words[8] = 0xC0A8;
        new_words[9] = 0x0001;
        let from_scratch_new = checksum_from_scratch(&new_words);

        assert_eq!(r.ip_checksum, from_scratch_new);
        assert_ne!(r.ip_checksum, from_scratch_old);
    }
}
