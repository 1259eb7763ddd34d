//! Splitting of payloads that do not fit in a single data command.

use super::hci::FragmentOperation;

/// Largest payload carried by one advertising data command.
pub const ADV_DATA_LEN_MAX: usize = 251;

/// Splits `data` into the fragments sent to the controller, in order.
///
/// An empty payload still yields a single empty `Complete` fragment, so the
/// controller's copy of the data is cleared.
pub fn fragments(data: &[u8]) -> Vec<(FragmentOperation, &[u8])> {
    if data.len() <= ADV_DATA_LEN_MAX {
        return vec![(FragmentOperation::Complete, data)];
    }

    let count = (data.len() + ADV_DATA_LEN_MAX - 1) / ADV_DATA_LEN_MAX;
    data.chunks(ADV_DATA_LEN_MAX)
        .enumerate()
        .map(|(i, chunk)| {
            let op = if i == 0 {
                FragmentOperation::First
            } else if i == count - 1 {
                FragmentOperation::Last
            } else {
                FragmentOperation::Intermediate
            };
            (op, chunk)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use FragmentOperation::*;

    fn ops(data: &[u8]) -> Vec<FragmentOperation> {
        fragments(data).into_iter().map(|(op, _)| op).collect()
    }

    #[test]
    fn test_empty_payload() {
        let frags = fragments(&[]);
        assert_eq!(frags.len(), 1);
        assert_eq!(frags[0].0, Complete);
        assert!(frags[0].1.is_empty());
    }

    #[test]
    fn test_fragment_operations() {
        assert_eq!(ops(&[0; 251]), vec![Complete]);
        assert_eq!(ops(&[0; 252]), vec![First, Last]);
        assert_eq!(ops(&[0; 502]), vec![First, Last]);
        assert_eq!(ops(&[0; 503]), vec![First, Intermediate, Last]);
        assert_eq!(
            ops(&[0; 1650]),
            vec![First, Intermediate, Intermediate, Intermediate, Intermediate, Intermediate, Last]
        );
    }

    #[test]
    fn test_fragments_reassemble() {
        let data: Vec<u8> = (0..800u32).map(|i| i as u8).collect();
        let frags = fragments(&data);

        assert_eq!(frags.len(), 4);
        assert!(frags.iter().take(3).all(|(_, chunk)| chunk.len() == ADV_DATA_LEN_MAX));
        assert_eq!(frags[3].1.len(), 800 - 3 * ADV_DATA_LEN_MAX);
        let joined: Vec<u8> = frags.iter().flat_map(|(_, chunk)| chunk.iter().cloned()).collect();
        assert_eq!(joined, data);
    }
}
