#[cfg(test)]
mod tests {
    use crate::error::MalformedEvent;
    use crate::models::{Tally, VoteChoice, VoteEvent};

    #[test]
    fn test_event_wire_format() {
        let event = VoteEvent::from_json(r#"{"voter_id":"v1","vote":"A"}"#).unwrap();
        assert_eq!(event.voter_id, "v1");
        assert_eq!(event.choice, VoteChoice::A);

        let round_trip = serde_json::to_string(&event).unwrap();
        assert_eq!(round_trip, r#"{"voter_id":"v1","vote":"A"}"#);
    }

    #[test]
    fn test_lowercase_votes_accepted() {
        let event = VoteEvent::from_json(r#"{"voter_id":"v2","vote":"b"}"#).unwrap();
        assert_eq!(event.choice, VoteChoice::B);
    }

    #[test]
    fn test_malformed_payloads() {
        assert!(matches!(
            VoteEvent::from_json("not json"),
            Err(MalformedEvent::InvalidJson(_))
        ));
        assert!(matches!(
            VoteEvent::from_json(r#"{"voter_id":"v1","vote":"C"}"#),
            Err(MalformedEvent::InvalidJson(_))
        ));
        assert!(matches!(
            VoteEvent::from_json(r#"{"voter_id":"v1"}"#),
            Err(MalformedEvent::InvalidJson(_))
        ));
        assert!(matches!(
            VoteEvent::from_json(r#"{"voter_id":"","vote":"A"}"#),
            Err(MalformedEvent::EmptyVoterId)
        ));
    }

    #[test]
    fn test_choice_column_round_trip() {
        assert_eq!(VoteChoice::from_column("A"), Some(VoteChoice::A));
        assert_eq!(VoteChoice::from_column("a"), Some(VoteChoice::A));
        assert_eq!(VoteChoice::from_column("b"), Some(VoteChoice::B));
        assert_eq!(VoteChoice::from_column("maybe"), None);
        assert_eq!(VoteChoice::A.as_str(), "A");
        assert_eq!(VoteChoice::B.as_str(), "B");
    }

    #[test]
    fn test_tally_broadcast_payload() {
        let tally = Tally { count_a: 3, count_b: 7 };
        assert_eq!(serde_json::to_string(&tally).unwrap(), r#"{"a":3,"b":7}"#);
        assert_eq!(tally.total(), 10);

        let parsed: Tally = serde_json::from_str(r#"{"a":0,"b":2}"#).unwrap();
        assert_eq!(parsed, Tally { count_a: 0, count_b: 2 });
    }
}
