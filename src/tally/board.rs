use crate::model::{Payload, TallyBoard};

/// Additive key-union merge of one document's payload into the board.
///
/// Keys present in both sides have their scores summed; keys present in
/// only one side carry through unchanged. Commutative and associative over
/// payloads, which is what makes cache-order-independent aggregation work.
pub fn merge_add(board: &mut TallyBoard, payload: &Payload) {
    for (league_id, contributors) in payload {
        let slot = board.entry(league_id.clone()).or_default();
        for (contributor, delta) in contributors {
            *slot.entry(contributor.clone()).or_insert(0.0) += delta;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn payload(entries: &[(&str, &str, f64)]) -> Payload {
        let mut payload = Payload::new();
        for (league, contributor, score) in entries {
            payload
                .entry(league.to_string())
                .or_insert_with(BTreeMap::new)
                .insert(contributor.to_string(), *score);
        }
        payload
    }

    #[test]
    fn test_merge_sums_shared_keys() {
        let mut board = TallyBoard::new();
        merge_add(&mut board, &payload(&[("league-a", "x", 50.0)]));
        merge_add(&mut board, &payload(&[("league-a", "x", 50.0)]));
        assert_eq!(board["league-a"]["x"], 100.0);
    }

    #[test]
    fn test_merge_carries_disjoint_keys() {
        let mut board = TallyBoard::new();
        merge_add(&mut board, &payload(&[("league-a", "x", 10.0)]));
        merge_add(&mut board, &payload(&[("league-b", "y", 20.0)]));
        assert_eq!(board["league-a"]["x"], 10.0);
        assert_eq!(board["league-b"]["y"], 20.0);
        assert_eq!(board.len(), 2);
    }

    #[test]
    fn test_merge_is_order_independent() {
        let payloads = [
            payload(&[("league-a", "x", 10.0), ("league-a", "y", 5.0)]),
            payload(&[("league-a", "x", 30.0)]),
            payload(&[("league-b", "x", 7.0)]),
        ];

        let mut forward = TallyBoard::new();
        for p in &payloads {
            merge_add(&mut forward, p);
        }
        let mut reverse = TallyBoard::new();
        for p in payloads.iter().rev() {
            merge_add(&mut reverse, p);
        }
        assert_eq!(forward, reverse);
        assert_eq!(forward["league-a"]["x"], 40.0);
    }

    #[test]
    fn test_merge_empty_payload_is_identity() {
        let mut board = TallyBoard::new();
        merge_add(&mut board, &payload(&[("league-a", "x", 10.0)]));
        let before = board.clone();
        merge_add(&mut board, &Payload::new());
        assert_eq!(board, before);
    }
}
