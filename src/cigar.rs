use crate::error::{Error, Result};

/// Packed CIGAR operation: the four most significant bits hold the op, the
/// remaining bits its length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CigarOp {
    val: u32,
}

const LEN_BITS: u32 = 28;
const LEN_MASK: u32 = (1 << LEN_BITS) - 1;

impl CigarOp {
    pub fn new(len: u32, op: char) -> Result<Self> {
        let code = match op {
            'M' => 0,
            'I' => 1,
            'D' => 2,
            'N' => 3,
            'S' => 4,
            'H' => 5,
            'P' => 6,
            '=' => 7,
            'X' => 8,
            _ => return Err(Error::InvalidCigar(format!("{len}{op}"))),
        };
        if len > LEN_MASK {
            return Err(Error::InvalidCigar(format!("{len}{op}")));
        }
        Ok(Self {
            val: (code << LEN_BITS) | len,
        })
    }

    pub fn op(&self) -> char {
        match self.val >> LEN_BITS {
            0 => 'M',
            1 => 'I',
            2 => 'D',
            3 => 'N',
            4 => 'S',
            5 => 'H',
            6 => 'P',
            7 => '=',
            _ => 'X',
        }
    }

    pub fn len(&self) -> u32 {
        self.val & LEN_MASK
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reference bases consumed by this operation.
    pub fn ref_delta(&self) -> i64 {
        match self.op() {
            'M' | 'D' | 'N' | '=' | 'X' => self.len() as i64,
            _ => 0,
        }
    }

    /// Read bases consumed by this operation.
    pub fn read_delta(&self) -> usize {
        match self.op() {
            'M' | 'I' | 'S' | '=' | 'X' => self.len() as usize,
            _ => 0,
        }
    }
}

pub fn parse_cigar(cigar: &str) -> Result<Vec<CigarOp>> {
    let mut ops = Vec::new();
    let mut len: u32 = 0;
    let mut has_digits = false;
    for c in cigar.chars() {
        if let Some(digit) = c.to_digit(10) {
            len = len
                .checked_mul(10)
                .and_then(|l| l.checked_add(digit))
                .ok_or_else(|| Error::InvalidCigar(cigar.to_string()))?;
            has_digits = true;
        } else {
            if !has_digits {
                return Err(Error::InvalidCigar(cigar.to_string()));
            }
            ops.push(CigarOp::new(len, c).map_err(|_| Error::InvalidCigar(cigar.to_string()))?);
            len = 0;
            has_digits = false;
        }
    }
    if has_digits {
        return Err(Error::InvalidCigar(cigar.to_string()));
    }
    Ok(ops)
}

/// Reference span of a CIGAR.
pub fn reference_length(ops: &[CigarOp]) -> i64 {
    ops.iter().map(CigarOp::ref_delta).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cigar_basic() {
        let ops = parse_cigar("3S10M2I4D5=1X").unwrap();
        let decoded: Vec<(u32, char)> = ops.iter().map(|op| (op.len(), op.op())).collect();
        assert_eq!(
            decoded,
            vec![(3, 'S'), (10, 'M'), (2, 'I'), (4, 'D'), (5, '='), (1, 'X')]
        );
        assert_eq!(reference_length(&ops), 20);
        assert_eq!(ops.iter().map(CigarOp::read_delta).sum::<usize>(), 21);
    }

    #[test]
    fn test_parse_cigar_invalid() {
        assert!(parse_cigar("10").is_err());
        assert!(parse_cigar("M").is_err());
        assert!(parse_cigar("5Q").is_err());
        assert!(parse_cigar("99999999999M").is_err());
        assert!(parse_cigar("").unwrap().is_empty());
    }
}
