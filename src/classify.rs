/// Whether a byte sequence should be treated as binary or text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub is_binary: bool,
}

/// Decides binary vs. text for content read from local files.
pub trait Classifier: Send + Sync {
    fn classify(&self, data: &[u8]) -> Classification;
}

/// Bytes inspected by [`HeuristicClassifier`].
const SNIFF_LEN: usize = 8 * 1024;

/// Treats content as binary if its leading bytes contain a NUL or are not UTF-8.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicClassifier;

impl Classifier for HeuristicClassifier {
    fn classify(&self, data: &[u8]) -> Classification {
        let head = &data[..data.len().min(SNIFF_LEN)];
        if head.contains(&0) {
            return Classification { is_binary: true };
        }

        let is_binary = match std::str::from_utf8(head) {
            Ok(_) => false,
            // A multi-byte character cut off by the sniff window is still text.
            Err(e) => e.error_len().is_some() || head.len() == data.len(),
        };
        Classification { is_binary }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_binary(data: &[u8]) -> bool {
        HeuristicClassifier.classify(data).is_binary
    }

    #[test]
    fn text_is_not_binary() {
        assert!(!is_binary(b"hello world"));
        assert!(!is_binary("ünïcödé".as_bytes()));
        assert!(!is_binary(b""));
    }

    #[test]
    fn nul_bytes_are_binary() {
        assert!(is_binary(&[0x00, 0x01, 0x02]));
    }

    #[test]
    fn invalid_utf8_is_binary() {
        assert!(is_binary(&[0xff, 0xfe, 0x41]));
    }

    #[test]
    fn truncated_character_at_window_edge_is_text() {
        let mut data = vec![b'a'; SNIFF_LEN - 1];
        data.extend_from_slice("é".as_bytes());
        assert!(!is_binary(&data));
    }
}
