//! OSC wire codec.
//!
//! Messages are 4-byte aligned: null-terminated address, then a
//! `,`-prefixed type tag string, then big-endian typed payloads. This is
//! the subset the X32 and Wing consoles speak: `f`, `i`, `s` and `b`.

use mix_core::DB_FLOOR;

/// One decoded OSC argument.
#[derive(Debug, Clone, PartialEq)]
pub enum OscArg {
    Float(f32),
    Int(i32),
    Str(String),
    Blob(Vec<u8>),
}

/// One decoded OSC message.
#[derive(Debug, Clone, PartialEq)]
pub struct OscPacket {
    pub address: String,
    pub args: Vec<OscArg>,
}

fn pad4(buf: &mut Vec<u8>) {
    while buf.len() % 4 != 0 {
        buf.push(0);
    }
}

fn push_str(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(s.as_bytes());
    buf.push(0);
    pad4(buf);
}

/// Encode an address with a single float argument.
pub fn encode_float(address: &str, value: f32) -> Vec<u8> {
    let mut msg = Vec::with_capacity(address.len() + 12);
    push_str(&mut msg, address);
    msg.extend_from_slice(b",f\0\0");
    msg.extend_from_slice(&value.to_bits().to_be_bytes());
    msg
}

/// Encode an address with a single int argument.
pub fn encode_int(address: &str, value: i32) -> Vec<u8> {
    let mut msg = Vec::with_capacity(address.len() + 12);
    push_str(&mut msg, address);
    msg.extend_from_slice(b",i\0\0");
    msg.extend_from_slice(&value.to_be_bytes());
    msg
}

/// Encode an address with a single string argument.
pub fn encode_str(address: &str, value: &str) -> Vec<u8> {
    let mut msg = Vec::with_capacity(address.len() + value.len() + 12);
    push_str(&mut msg, address);
    msg.extend_from_slice(b",s\0\0");
    push_str(&mut msg, value);
    msg
}

/// Encode a bare query (address only, no arguments).
pub fn encode_query(address: &str) -> Vec<u8> {
    let mut msg = Vec::with_capacity(address.len() + 4);
    push_str(&mut msg, address);
    msg
}

fn aligned_str_end(data: &[u8], start: usize) -> Option<usize> {
    let nul = data[start..].iter().position(|&b| b == 0)? + start;
    let mut end = nul + 1;
    while end % 4 != 0 {
        end += 1;
    }
    Some(end)
}

/// Decode a single OSC message. Returns `None` on any malformed input;
/// callers drop such datagrams silently.
pub fn decode(data: &[u8]) -> Option<OscPacket> {
    if data.len() < 4 || data[0] != b'/' {
        return None;
    }

    let addr_end = aligned_str_end(data, 0)?;
    let address = std::str::from_utf8(&data[..data[..addr_end].iter().position(|&b| b == 0)?])
        .ok()?
        .to_string();

    // Bare query: no type tag string
    if addr_end >= data.len() {
        return Some(OscPacket { address, args: Vec::new() });
    }
    if data[addr_end] != b',' {
        return None;
    }

    let tags_end = aligned_str_end(data, addr_end)?;
    let tags: Vec<u8> = data[addr_end + 1..tags_end]
        .iter()
        .copied()
        .take_while(|&b| b != 0)
        .collect();

    let mut offset = tags_end;
    let mut args = Vec::with_capacity(tags.len());
    for tag in tags {
        match tag {
            b'f' => {
                let bytes = data.get(offset..offset + 4)?;
                args.push(OscArg::Float(f32::from_bits(u32::from_be_bytes(
                    bytes.try_into().ok()?,
                ))));
                offset += 4;
            }
            b'i' => {
                let bytes = data.get(offset..offset + 4)?;
                args.push(OscArg::Int(i32::from_be_bytes(bytes.try_into().ok()?)));
                offset += 4;
            }
            b's' => {
                let end = aligned_str_end(data, offset)?;
                let nul = data[offset..].iter().position(|&b| b == 0)? + offset;
                args.push(OscArg::Str(
                    std::str::from_utf8(&data[offset..nul]).ok()?.to_string(),
                ));
                offset = end;
            }
            b'b' => {
                let len_bytes = data.get(offset..offset + 4)?;
                let blob_len = u32::from_be_bytes(len_bytes.try_into().ok()?) as usize;
                offset += 4;
                let blob = data.get(offset..offset + blob_len)?;
                args.push(OscArg::Blob(blob.to_vec()));
                offset += blob_len;
                while offset % 4 != 0 {
                    offset += 1;
                }
            }
            _ => return None,
        }
    }

    Some(OscPacket { address, args })
}

/// Decode consecutive big-endian float32 levels from a meter blob.
pub fn decode_meter_levels(blob: &[u8], max_channels: usize) -> Vec<f32> {
    blob.chunks_exact(4)
        .take(max_channels)
        .map(|c| f32::from_bits(u32::from_be_bytes([c[0], c[1], c[2], c[3]])))
        .collect()
}

/// Convert a normalised meter level in [0,1] to dBFS, floored at -96.
pub fn level_to_dbfs(level: f32) -> f32 {
    if level > 1e-4 {
        (20.0 * level.log10()).max(DB_FLOOR)
    } else {
        DB_FLOOR
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_round_trip() {
        let msg = encode_float("/ch/01/mix/fader", 0.75);
        assert_eq!(msg.len() % 4, 0);
        let pkt = decode(&msg).unwrap();
        assert_eq!(pkt.address, "/ch/01/mix/fader");
        assert_eq!(pkt.args, vec![OscArg::Float(0.75)]);
    }

    #[test]
    fn test_int_round_trip() {
        let pkt = decode(&encode_int("/ch/01/mix/on", 1)).unwrap();
        assert_eq!(pkt.args, vec![OscArg::Int(1)]);
    }

    #[test]
    fn test_str_round_trip() {
        let pkt = decode(&encode_str("/ch/05/config/name", "Kick")).unwrap();
        assert_eq!(pkt.address, "/ch/05/config/name");
        assert_eq!(pkt.args, vec![OscArg::Str("Kick".into())]);
    }

    #[test]
    fn test_query_has_no_args() {
        let msg = encode_query("/xremote");
        assert_eq!(msg.len() % 4, 0);
        let pkt = decode(&msg).unwrap();
        assert_eq!(pkt.address, "/xremote");
        assert!(pkt.args.is_empty());
    }

    #[test]
    fn test_alignment_of_various_address_lengths() {
        for addr in ["/a", "/ab", "/abc", "/abcd", "/abcde"] {
            let msg = encode_float(addr, 1.0);
            assert_eq!(msg.len() % 4, 0, "unaligned for {}", addr);
            assert_eq!(decode(&msg).unwrap().address, addr);
        }
    }

    #[test]
    fn test_malformed_input_rejected() {
        assert!(decode(&[]).is_none());
        assert!(decode(b"xinfo\0\0\0").is_none());
        // Truncated float payload
        let mut msg = encode_float("/ch/01/mix/fader", 0.5);
        msg.truncate(msg.len() - 2);
        assert!(decode(&msg).is_none());
    }

    #[test]
    fn test_blob_decode() {
        let mut msg = Vec::new();
        msg.extend_from_slice(b"/meters\0");
        msg.extend_from_slice(b",b\0\0");
        let levels: Vec<u8> = [0.5f32, 1.0, 0.0]
            .iter()
            .flat_map(|f| f.to_bits().to_be_bytes())
            .collect();
        msg.extend_from_slice(&(levels.len() as u32).to_be_bytes());
        msg.extend_from_slice(&levels);

        let pkt = decode(&msg).unwrap();
        let OscArg::Blob(blob) = &pkt.args[0] else { panic!("expected blob") };
        let decoded = decode_meter_levels(blob, 32);
        assert_eq!(decoded, vec![0.5, 1.0, 0.0]);
    }

    #[test]
    fn test_level_to_dbfs() {
        assert_eq!(level_to_dbfs(0.0), -96.0);
        assert_eq!(level_to_dbfs(1e-5), -96.0);
        assert!((level_to_dbfs(1.0) - 0.0).abs() < 1e-5);
        assert!((level_to_dbfs(0.1) - -20.0).abs() < 1e-3);
    }
}
