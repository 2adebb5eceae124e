//! Delta coding of id, coordinate and reference arrays.

/// Running decoder for one delta-coded array; start a new one per group.
#[derive(Debug, Default, Clone, Copy)]
pub struct DeltaDecoder {
    last: i64,
}

impl DeltaDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&mut self, delta: i64) -> i64 {
        self.last = self.last.wrapping_add(delta);
        self.last
    }
}

pub fn decode(deltas: &[i64]) -> Vec<i64> {
    let mut decoder = DeltaDecoder::new();
    deltas.iter().map(|&d| decoder.next(d)).collect()
}

pub fn encode(values: &[i64]) -> Vec<i64> {
    let mut last = 0i64;
    values
        .iter()
        .map(|&v| {
            let d = v.wrapping_sub(last);
            last = v;
            d
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_cumulative_sums() {
        assert_eq!(decode(&[10, 1, 1, -5]), vec![10, 11, 12, 7]);
        assert!(decode(&[]).is_empty());
    }

    #[test]
    fn decode_then_encode_restores_deltas() {
        let deltas = [4_000_000_000, -3, 0, 17, i64::MIN / 2, 9];
        assert_eq!(encode(&decode(&deltas)), deltas);
    }

    #[test]
    fn decoder_restarts_per_group() {
        let mut first = DeltaDecoder::new();
        first.next(100);
        let mut second = DeltaDecoder::new();
        assert_eq!(second.next(5), 5);
    }
}
