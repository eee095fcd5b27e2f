//! Implementation for encoding and decoding of ChanCells.

use super::{ChanCell, CELL_DATA_LEN};
use crate::chancell::{ChanCmd, ChanMsg, CircId};
use crate::Error;
use ornet_bytes::{self, Reader, Writer};

use bytes::BytesMut;

/// This object can be used to encode and decode channel cells.
///
/// The implemented format is one of the following:
///
/// Variable-length cells (only VERSIONS, at present):
/// ```ignore
///     u16 circid;
///     u8 command;
///     u16 len;
///     u8 body[len];
/// ```
///
/// Fixed-width cells (everything else):
/// ```ignore
///     u16 circid;
///     u8 command;
///     u8 body[509];
/// ```
pub struct ChannelCodec {
    /// The negotiated link protocol version for this channel.
    ///
    /// Affects which commands are legal, but not the framing itself:
    /// on every version we implement, circuit IDs are two bytes.
    #[allow(dead_code)]
    link_version: u16,
}

impl ChannelCodec {
    /// Create a new ChannelCodec with a given link protocol version.
    pub fn new(link_version: u16) -> Self {
        ChannelCodec { link_version }
    }

    /// Write the given cell into the provided BytesMut object.
    pub fn write_cell<M: ChanMsg>(
        &mut self,
        item: ChanCell<M>,
        dst: &mut BytesMut,
    ) -> crate::Result<()> {
        let (circid, msg) = item.into_circid_and_msg();
        let cmd = msg.cmd();
        dst.write_u16(CircId::get_or_zero(circid));
        dst.write_u8(cmd.into());

        let pos = dst.len(); // always 3.
        if cmd.is_var_cell() {
            dst.write_u16(0);
            msg.encode_onto(dst)?;
            let len = dst.len() - pos - 2;
            if len > u16::MAX as usize {
                return Err(Error::Internal("ran out of space for varcell"));
            }
            // go back and fill in the length.
            dst[pos..pos + 2].copy_from_slice(&(len as u16).to_be_bytes());
        } else {
            msg.encode_onto(dst)?;
            let len = dst.len() - pos;
            if len > CELL_DATA_LEN {
                return Err(Error::Internal("ran out of space for cell"));
            }
            // pad to the end of the fixed-length cell.
            dst.write_zeros(CELL_DATA_LEN - len);
        }
        Ok(())
    }

    /// Try to decode a cell from the provided BytesMut object.
    ///
    /// On a definite decoding error, return Err(_).  On a cell that might
    /// just be truncated, return Ok(None): a short read is how links end,
    /// not a protocol violation.
    pub fn decode_cell<M: ChanMsg>(
        &mut self,
        src: &mut BytesMut,
    ) -> crate::Result<Option<ChanCell<M>>> {
        /// Wrap a bytes error as a cell-level error.
        fn wrap_err(err: ornet_bytes::Error) -> Error {
            Error::BytesErr {
                err,
                parsed: "channel cell",
            }
        }

        if src.len() < 5 {
            // Smallest possible cell: a varcell with a zero-length body.
            return Ok(None);
        }
        let cmd: ChanCmd = src[2].into();
        let varcell = cmd.is_var_cell();
        let cell_len: usize = if varcell {
            let msg_len = u16::from_be_bytes(
                src[3..5].try_into().expect("two-byte slice not two bytes!?"),
            );
            msg_len as usize + 5
        } else {
            super::CELL_LEN
        };
        if src.len() < cell_len {
            return Ok(None);
        }

        let cell = src.split_to(cell_len).freeze();
        let mut r = Reader::from_bytes(&cell);
        let circid: Option<CircId> = CircId::new(r.take_u16().map_err(wrap_err)?);
        r.advance(if varcell { 3 } else { 1 }).map_err(wrap_err)?;
        let msg = M::decode_from_reader(cmd, &mut r).map_err(wrap_err)?;

        if !cmd.accepts_circid_val(circid) {
            return Err(Error::ChanProto(format!(
                "invalid circuit ID {} for cell command {}",
                CircId::get_or_zero(circid),
                cmd
            )));
        }
        Ok(Some(ChanCell::new(circid, msg)))
    }
}

#[cfg(test)]
mod test {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::chancell::msg::{self, AnyChanMsg};
    use crate::chancell::AnyChanCell;

    fn encode(cell: AnyChanCell) -> BytesMut {
        let mut buf = BytesMut::new();
        ChannelCodec::new(2).write_cell(cell, &mut buf).unwrap();
        buf
    }

    #[test]
    fn fixed_cell_round_trip() {
        let destroy = msg::Destroy::new(4.into());
        let cell = AnyChanCell::new(CircId::new(0x2015), destroy.into());
        let mut buf = encode(cell);
        assert_eq!(buf.len(), 512);
        assert_eq!(&buf[..4], &[0x20, 0x15, 0x04, 0x04]);
        assert!(buf[4..].iter().all(|b| *b == 0));

        let decoded: AnyChanCell = ChannelCodec::new(2)
            .decode_cell(&mut buf)
            .unwrap()
            .expect("no cell");
        assert_eq!(decoded.circid(), CircId::new(0x2015));
        match decoded.msg() {
            AnyChanMsg::Destroy(d) => assert_eq!(d.reason(), 4.into()),
            other => panic!("wrong message {:?}", other),
        }
    }

    #[test]
    fn var_cell_round_trip() {
        let versions = msg::Versions::new(vec![1, 2, 3]).unwrap();
        let cell = AnyChanCell::new(None, versions.into());
        let mut buf = encode(cell);
        assert_eq!(&buf[..], &[0, 0, 7, 0, 6, 0, 1, 0, 2, 0, 3]);

        let decoded: AnyChanCell = ChannelCodec::new(2)
            .decode_cell(&mut buf)
            .unwrap()
            .expect("no cell");
        assert!(decoded.circid().is_none());
        match decoded.msg() {
            AnyChanMsg::Versions(v) => {
                assert_eq!(v.best_shared_link_protocol(&[2, 4]), Some(2));
            }
            other => panic!("wrong message {:?}", other),
        }
    }

    #[test]
    fn zero_length_var_cell() {
        let mut buf = BytesMut::from(&[0_u8, 0, 7, 0, 0][..]);
        let decoded: AnyChanCell = ChannelCodec::new(2)
            .decode_cell(&mut buf)
            .unwrap()
            .expect("no cell");
        match decoded.msg() {
            AnyChanMsg::Versions(v) => {
                assert_eq!(v.best_shared_link_protocol(&[1, 2]), None);
            }
            other => panic!("wrong message {:?}", other),
        }
    }

    #[test]
    fn truncated_input_is_not_an_error() {
        let mut codec = ChannelCodec::new(2);
        // Too short even for a header.
        let mut buf = BytesMut::from(&[0_u8, 1, 3][..]);
        assert!(codec.decode_cell::<AnyChanMsg>(&mut buf).unwrap().is_none());
        // A fixed cell missing its tail.
        let mut buf = BytesMut::from(&[0_u8; 100][..]);
        buf[2] = 0; // PADDING
        assert!(codec.decode_cell::<AnyChanMsg>(&mut buf).unwrap().is_none());
        // A var cell missing part of its body.
        let mut buf = BytesMut::from(&[0_u8, 0, 7, 0, 4, 0, 1][..]);
        assert!(codec.decode_cell::<AnyChanMsg>(&mut buf).unwrap().is_none());
    }

    #[test]
    fn bad_circid_for_command() {
        // NETINFO must have a zero circuit ID.
        let mut buf = BytesMut::zeroed(512);
        buf[0] = 0x01;
        buf[1] = 0x02;
        buf[2] = 8; // NETINFO
        let r = ChannelCodec::new(2).decode_cell::<AnyChanMsg>(&mut buf);
        assert!(matches!(r, Err(Error::ChanProto(_))));
    }

    #[test]
    fn encode_decode_unknown_command() {
        // Unknown fixed-length commands decode as Unrecognized; dealing
        // with them (dropping, usually) is the dispatcher's business.
        let mut buf = BytesMut::zeroed(512);
        buf[1] = 0x01;
        buf[2] = 99;
        let decoded: AnyChanCell = ChannelCodec::new(2)
            .decode_cell(&mut buf)
            .unwrap()
            .expect("no cell");
        match decoded.msg() {
            AnyChanMsg::Unrecognized(u) => assert_eq!(u.cmd(), 99.into()),
            other => panic!("wrong message {:?}", other),
        }
    }
}
