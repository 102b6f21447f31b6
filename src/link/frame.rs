use etherparse::{Ethernet2Header, Ethernet2HeaderSlice};

use super::{AitFrame, LinkAddr, ETH_P_ECLP};
use crate::Error;

pub const ETHER_HEADER_LEN: usize = 14;
pub const CONTROL_WORD_LEN: usize = 6;

/// Destination MAC top byte: route through the forwarding table.
pub const FORWARD_BIT: u8 = 0x80;
/// Source MAC top byte: backward direction / deliver to host on backward.
pub const DIRECTION_BIT: u8 = 0x80;
pub const HOST_ON_BACKWARD_BIT: u8 = 0x40;

pub const BROADCAST_MAC: [u8; 6] = [0xff; 6];

/// Decoded view of one link frame. ECLP frames carry the 16-bit control
/// word and 32-bit seqno right after the Ethernet header; discovery and
/// local-delivery frames are header plus opaque payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EclpFrame<'a> {
    pub dest: [u8; 6],
    pub source: [u8; 6],
    pub ether_type: u16,
    pub msg_raw: u16,
    pub seqno: u32,
    pub payload: &'a [u8],
}

impl<'a> EclpFrame<'a> {
    pub fn parse(buf: &'a [u8]) -> Result<Self, Error> {
        let eth = Ethernet2HeaderSlice::from_slice(buf).map_err(|_| Error::ShortFrame(buf.len()))?;
        let ether_type = eth.ether_type();
        let rest = &buf[ETHER_HEADER_LEN..];

        let (msg_raw, seqno, payload) = if ether_type == ETH_P_ECLP {
            if rest.len() < CONTROL_WORD_LEN {
                return Err(Error::ShortFrame(buf.len()));
            }
            (
                u16::from_be_bytes([rest[0], rest[1]]),
                u32::from_be_bytes([rest[2], rest[3], rest[4], rest[5]]),
                &rest[CONTROL_WORD_LEN..],
            )
        } else {
            (0, 0, rest)
        };

        Ok(EclpFrame {
            dest: eth.destination(),
            source: eth.source(),
            ether_type,
            msg_raw,
            seqno,
            payload,
        })
    }

    pub fn from_addr(&self) -> LinkAddr {
        LinkAddr::from_mac(self.source)
    }

    pub fn wants_forward(&self) -> bool {
        self.dest[0] & FORWARD_BIT != 0
    }

    pub fn is_backward(&self) -> bool {
        self.source[0] & DIRECTION_BIT != 0
    }

    pub fn host_on_backward(&self) -> bool {
        self.source[0] & HOST_ON_BACKWARD_BIT != 0
    }

    /// 32-bit next-hop id from source MAC bytes 2..6.
    pub fn next_hop_id(&self) -> u32 {
        u32::from_be_bytes([self.source[2], self.source[3], self.source[4], self.source[5]])
    }

    /// ALO command word from destination MAC bytes 2..4.
    pub fn alo_command(&self) -> u16 {
        u16::from_be_bytes([self.dest[2], self.dest[3]])
    }

    /// Length-prefixed payload region of a data-bearing frame.
    pub fn data_payload(&self) -> Result<&'a [u8], Error> {
        if self.payload.len() < 4 {
            return Err(Error::ShortFrame(self.payload.len()));
        }
        let len = u32::from_be_bytes([
            self.payload[0],
            self.payload[1],
            self.payload[2],
            self.payload[3],
        ]) as usize;
        if self.payload.len() < 4 + len {
            return Err(Error::ShortFrame(self.payload.len()));
        }
        Ok(&self.payload[4..4 + len])
    }

    /// Atomic payload: length-prefixed and bounded.
    pub fn ait_payload(&self) -> Result<AitFrame, Error> {
        AitFrame::new(self.data_payload()?.to_vec())
    }
}

fn frame_with(dst: [u8; 6], src: [u8; 6], ether_type: u16, extra: usize) -> Vec<u8> {
    let mut buf = Vec::with_capacity(ETHER_HEADER_LEN + CONTROL_WORD_LEN + extra);
    Ethernet2Header {
        destination: dst,
        source: src,
        ether_type,
    }
    .write(&mut buf)
    .unwrap();
    buf
}

/// Bare control frame: HELLO, EVENT, NOP, ACK.
pub fn control_frame(dst: [u8; 6], src: LinkAddr, msg_raw: u16, seqno: u32) -> Vec<u8> {
    let mut buf = frame_with(dst, src.to_mac(), ETH_P_ECLP, 0);
    buf.extend_from_slice(&msg_raw.to_be_bytes());
    buf.extend_from_slice(&seqno.to_be_bytes());
    buf
}

/// AIT data-bearing frame: control word plus length-prefixed payload.
pub fn ait_frame(dst: [u8; 6], src: LinkAddr, msg_raw: u16, seqno: u32, ait: &AitFrame) -> Vec<u8> {
    let mut buf = frame_with(dst, src.to_mac(), ETH_P_ECLP, 4 + ait.data().len());
    buf.extend_from_slice(&msg_raw.to_be_bytes());
    buf.extend_from_slice(&seqno.to_be_bytes());
    buf.extend_from_slice(&ait.message_len().to_be_bytes());
    buf.extend_from_slice(ait.data());
    buf
}

/// EVENT frame carrying one piggybacked host frame as opaque payload.
pub fn data_frame(dst: [u8; 6], src: LinkAddr, msg_raw: u16, seqno: u32, data: &[u8]) -> Vec<u8> {
    let mut buf = frame_with(dst, src.to_mac(), ETH_P_ECLP, 4 + data.len());
    buf.extend_from_slice(&msg_raw.to_be_bytes());
    buf.extend_from_slice(&seqno.to_be_bytes());
    buf.extend_from_slice(&(data.len() as u32).to_be_bytes());
    buf.extend_from_slice(data);
    buf
}

/// Fire-and-forget discovery frame; no control word.
pub fn discovery_frame(dst: [u8; 6], src: LinkAddr, ether_type: u16, payload: &[u8]) -> Vec<u8> {
    let mut buf = frame_with(dst, src.to_mac(), ether_type, payload.len());
    buf.extend_from_slice(payload);
    buf
}

/// Stamp the next-hop id into an outgoing frame's source MAC.
pub fn set_next_hop(frame: &mut [u8], next_id: u32) -> Result<(), Error> {
    let id = next_id.to_be_bytes();
    let len = frame.len();
    frame
        .get_mut(8..12)
        .ok_or(Error::ShortFrame(len))?
        .copy_from_slice(&id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::MsgType;

    #[test]
    fn control_frame_round_trip() {
        let src = LinkAddr::new(0x0001, 0x0000_0002);
        let buf = control_frame(BROADCAST_MAC, src, MsgType::Event.raw(), 42);

        let frame = EclpFrame::parse(&buf).unwrap();
        assert_eq!(frame.ether_type, ETH_P_ECLP);
        assert_eq!(frame.msg_raw, MsgType::Event.raw());
        assert_eq!(frame.seqno, 42);
        assert_eq!(frame.from_addr(), src);
        assert!(frame.payload.is_empty());
    }

    #[test]
    fn ait_frame_round_trip() {
        let src = LinkAddr::new(0x0001, 0x0000_0002);
        let ait = AitFrame::new(b"hello".to_vec()).unwrap();
        let buf = ait_frame([0u8; 6], src, MsgType::Ait.raw(), 8, &ait);

        let frame = EclpFrame::parse(&buf).unwrap();
        assert_eq!(frame.seqno, 8);
        assert_eq!(frame.ait_payload().unwrap(), ait);
    }

    #[test]
    fn short_frame_is_rejected() {
        assert!(matches!(
            EclpFrame::parse(&[0u8; 10]),
            Err(Error::ShortFrame(_))
        ));

        // Ethernet header alone is not enough for a link frame.
        let buf = control_frame(BROADCAST_MAC, LinkAddr::new(1, 1), 0, 0);
        assert!(matches!(
            EclpFrame::parse(&buf[..ETHER_HEADER_LEN + 2]),
            Err(Error::ShortFrame(_))
        ));
    }

    #[test]
    fn next_hop_stamp_lands_in_source_mac() {
        let mut buf = control_frame(BROADCAST_MAC, LinkAddr::new(1, 1), 0, 0);
        set_next_hop(&mut buf, 0xAABBCCDD).unwrap();

        let frame = EclpFrame::parse(&buf).unwrap();
        assert_eq!(frame.next_hop_id(), 0xAABBCCDD);
    }

    #[test]
    fn next_hop_stamp_refuses_short_buffers() {
        let mut runt = [0u8; 10];
        assert!(matches!(
            set_next_hop(&mut runt, 1),
            Err(Error::ShortFrame(10))
        ));
    }
}
