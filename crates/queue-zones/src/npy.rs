//! Minimal reader for NumPy `.npy` files holding `(N, 4)` numeric arrays.

const MAGIC: &[u8] = b"\x93NUMPY";

#[derive(Debug, thiserror::Error)]
pub enum NpyError {
    #[error("not an npy file")]
    BadMagic,
    #[error("truncated file")]
    Truncated,
    #[error("unsupported npy version {0}")]
    Version(u8),
    #[error("malformed header: {0}")]
    Header(String),
    #[error("unsupported dtype {0}")]
    Dtype(String),
    #[error("expected shape (N, 4), got {0:?}")]
    Shape(Vec<usize>),
}

#[derive(Debug, Clone, Copy)]
enum Kind { Int, Uint, Float }

#[derive(Debug, Clone, Copy)]
struct Dtype { kind: Kind, size: usize }

impl Dtype {
    fn parse(descr: &str) -> Result<Self, NpyError> {
        let err = || NpyError::Dtype(descr.to_string());
        let order = descr.chars().next().ok_or_else(err)?;
        let mut chars = descr[order.len_utf8()..].chars();
        let kind = match chars.next() {
            Some('i') => Kind::Int,
            Some('u') => Kind::Uint,
            Some('f') => Kind::Float,
            _ => return Err(err()),
        };
        let size: usize = chars.as_str().parse().map_err(|_| err())?;
        let ok_size = match kind {
            Kind::Float => matches!(size, 4 | 8),
            _ => matches!(size, 1 | 2 | 4 | 8),
        };
        // big-endian data is rejected; single bytes have no order
        let ok_order = order == '<' || (order == '|' && size == 1);
        if !ok_size || !ok_order {
            return Err(err());
        }
        Ok(Self { kind, size })
    }

    fn read(&self, b: &[u8]) -> f64 {
        match (self.kind, self.size) {
            (Kind::Int, 1) => b[0] as i8 as f64,
            (Kind::Int, 2) => i16::from_le_bytes([b[0], b[1]]) as f64,
            (Kind::Int, 4) => i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64,
            (Kind::Int, _) => i64::from_le_bytes(b[..8].try_into().unwrap_or_default()) as f64,
            (Kind::Uint, 1) => b[0] as f64,
            (Kind::Uint, 2) => u16::from_le_bytes([b[0], b[1]]) as f64,
            (Kind::Uint, 4) => u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64,
            (Kind::Uint, _) => u64::from_le_bytes(b[..8].try_into().unwrap_or_default()) as f64,
            (Kind::Float, 4) => f32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64,
            (Kind::Float, _) => f64::from_le_bytes(b[..8].try_into().unwrap_or_default()),
        }
    }
}

/// Reads `(N, 4)` rows, truncating floats toward zero. A flat `(4,)` array is one row.
pub fn read_rows4(bytes: &[u8]) -> Result<Vec<[i64; 4]>, NpyError> {
    if !bytes.starts_with(MAGIC) {
        return Err(NpyError::BadMagic);
    }
    let major = *bytes.get(6).ok_or(NpyError::Truncated)?;
    let (len, start) = match major {
        1 => {
            let b = bytes.get(8..10).ok_or(NpyError::Truncated)?;
            (u16::from_le_bytes([b[0], b[1]]) as usize, 10)
        }
        2 | 3 => {
            let b = bytes.get(8..12).ok_or(NpyError::Truncated)?;
            (u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as usize, 12)
        }
        v => return Err(NpyError::Version(v)),
    };
    let header = bytes.get(start..start + len).ok_or(NpyError::Truncated)?;
    let header = std::str::from_utf8(header).map_err(|e| NpyError::Header(e.to_string()))?;

    let dtype = Dtype::parse(dict_value(header, "descr")?.trim_matches(|c| c == '\'' || c == '"'))?;
    let fortran = match dict_value(header, "fortran_order")? {
        "True" => true,
        "False" => false,
        other => return Err(NpyError::Header(format!("fortran_order = {}", other))),
    };
    let shape = parse_shape(dict_value(header, "shape")?)?;
    let rows = match shape.as_slice() {
        [4] => 1,
        [n, 4] => *n,
        _ => return Err(NpyError::Shape(shape)),
    };

    let need = rows
        .checked_mul(4)
        .and_then(|n| n.checked_mul(dtype.size))
        .ok_or_else(|| NpyError::Shape(shape.clone()))?;
    let data = bytes.get(start + len..).ok_or(NpyError::Truncated)?;
    let data = data.get(..need).ok_or(NpyError::Truncated)?;
    let values: Vec<i64> = data.chunks_exact(dtype.size).map(|b| dtype.read(b) as i64).collect();

    let at = |r: usize, c: usize| {
        let idx = if fortran { c * rows + r } else { r * 4 + c };
        values.get(idx).copied().ok_or(NpyError::Truncated)
    };
    (0..rows)
        .map(|r| -> Result<[i64; 4], NpyError> { Ok([at(r, 0)?, at(r, 1)?, at(r, 2)?, at(r, 3)?]) })
        .collect()
}

/// Raw text of `key`'s value in the header's Python dict literal.
fn dict_value<'a>(header: &'a str, key: &str) -> Result<&'a str, NpyError> {
    let missing = || NpyError::Header(format!("missing key {}", key));
    let pos = header
        .find(&format!("'{}'", key))
        .or_else(|| header.find(&format!("\"{}\"", key)))
        .ok_or_else(missing)?;
    let rest = &header[pos + key.len() + 2..];
    let rest = rest.trim_start().strip_prefix(':').ok_or_else(missing)?.trim_start();

    let end = match rest.chars().next() {
        Some('(') => rest.find(')').map(|i| i + 1),
        Some(q @ ('\'' | '"')) => rest[1..].find(q).map(|i| i + 2),
        Some(_) => rest.find(|c| c == ',' || c == '}'),
        None => None,
    }
    .ok_or_else(|| NpyError::Header(format!("unterminated value for {}", key)))?;
    Ok(rest[..end].trim())
}

fn parse_shape(s: &str) -> Result<Vec<usize>, NpyError> {
    let inner = s
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .ok_or_else(|| NpyError::Header(format!("shape {}", s)))?;
    inner
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| p.parse().map_err(|_| NpyError::Header(format!("shape {}", s))))
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn encode(descr: &str, fortran: bool, shape: &str, data: &[u8]) -> Vec<u8> {
        let mut header = format!(
            "{{'descr': '{}', 'fortran_order': {}, 'shape': {}, }}",
            descr,
            if fortran { "True" } else { "False" },
            shape
        );
        while (10 + header.len() + 1) % 64 != 0 {
            header.push(' ');
        }
        header.push('\n');
        let mut out = MAGIC.to_vec();
        out.extend_from_slice(&[1, 0]);
        out.extend_from_slice(&(header.len() as u16).to_le_bytes());
        out.extend_from_slice(header.as_bytes());
        out.extend_from_slice(data);
        out
    }

    pub(crate) fn encode_i8_rows(rows: &[[i64; 4]]) -> Vec<u8> {
        let data: Vec<u8> = rows.iter().flatten().flat_map(|v| v.to_le_bytes()).collect();
        encode("<i8", false, &format!("({}, 4)", rows.len()), &data)
    }

    #[test]
    fn reads_int64_rows() {
        let rows = [[620, 1, 915, 562], [1000, 1, 1264, 461]];
        assert_eq!(read_rows4(&encode_i8_rows(&rows)).unwrap(), rows.to_vec());
    }

    #[test]
    fn reads_float32_fortran_order() {
        // logical rows [1.9, 2, 3, 4] and [5, 6, 7, 8.5], stored column-major
        let vals: [f32; 8] = [1.9, 5.0, 2.0, 6.0, 3.0, 7.0, 4.0, 8.5];
        let data: Vec<u8> = vals.iter().flat_map(|v| v.to_le_bytes()).collect();
        let bytes = encode("<f4", true, "(2, 4)", &data);
        assert_eq!(read_rows4(&bytes).unwrap(), vec![[1, 2, 3, 4], [5, 6, 7, 8]]);
    }

    #[test]
    fn flat_array_is_one_row() {
        let data: Vec<u8> = [10i32, 20, 30, 40].iter().flat_map(|v| v.to_le_bytes()).collect();
        assert_eq!(read_rows4(&encode("<i4", false, "(4,)", &data)).unwrap(), vec![[10, 20, 30, 40]]);
    }

    #[test]
    fn rejects_bad_inputs() {
        assert!(matches!(read_rows4(b"PK\x03\x04"), Err(NpyError::BadMagic)));
        assert!(matches!(read_rows4(&encode(">i4", false, "(1, 4)", &[0; 16])), Err(NpyError::Dtype(_))));
        assert!(matches!(read_rows4(&encode("<i4", false, "(2, 3)", &[0; 24])), Err(NpyError::Shape(_))));
        assert!(matches!(read_rows4(&encode("<i8", false, "(2, 4)", &[0; 16])), Err(NpyError::Truncated)));
    }

    #[test]
    fn non_ascii_dtype_is_rejected() {
        let bytes = encode("\u{e9}4", false, "(1, 4)", &[0; 16]);
        assert!(matches!(read_rows4(&bytes), Err(NpyError::Dtype(_))));
        assert!(matches!(read_rows4(&encode("", false, "(1, 4)", &[0; 16])), Err(NpyError::Dtype(_))));
    }

    #[test]
    fn oversized_shape_is_rejected() {
        let bytes = encode("<i8", false, "(4611686018427387904, 4)", &[0; 32]);
        assert!(matches!(read_rows4(&bytes), Err(NpyError::Shape(_))));
        let fortran = encode("<i8", true, "(1000000, 4)", &[0; 32]);
        assert!(matches!(read_rows4(&fortran), Err(NpyError::Truncated)));
    }
}
