/// Canonical topic naming: one topic per unordered participant pair
///
/// Both participants must compute the identical topic without coordination,
/// so the two ids are sorted before joining. Ids are percent-encoded so the
/// separator cannot occur inside an encoded id.
const TOPIC_PREFIX: &str = "dm";
const TOPIC_SEPARATOR: char = ':';

/// Derive the broadcast topic for a direct conversation between `a` and `b`.
/// Symmetric: `derive_topic(a, b) == derive_topic(b, a)`.
pub fn derive_topic(a: &str, b: &str) -> String {
    let ea = urlencoding::encode(a);
    let eb = urlencoding::encode(b);
    let (lo, hi) = if ea <= eb { (ea, eb) } else { (eb, ea) };
    format!(
        "{}{}{}{}{}",
        TOPIC_PREFIX, TOPIC_SEPARATOR, lo, TOPIC_SEPARATOR, hi
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_is_symmetric() {
        assert_eq!(derive_topic("u1", "u2"), derive_topic("u2", "u1"));
        assert_eq!(derive_topic("alice", "bob"), derive_topic("bob", "alice"));
    }

    #[test]
    fn test_topic_shape() {
        assert_eq!(derive_topic("u2", "u1"), "dm:u1:u2");
    }

    #[test]
    fn test_distinct_pairs_get_distinct_topics() {
        let pairs = [("u1", "u2"), ("u1", "u3"), ("u2", "u3"), ("u1", "u10")];
        let topics: Vec<String> = pairs.iter().map(|(a, b)| derive_topic(a, b)).collect();
        for (i, t) in topics.iter().enumerate() {
            for (j, u) in topics.iter().enumerate() {
                if i != j {
                    assert_ne!(t, u, "pairs {:?} and {:?} collided", pairs[i], pairs[j]);
                }
            }
        }
    }

    #[test]
    fn test_separator_inside_id_cannot_collide() {
        // Without escaping, ("a:b", "c") and ("a", "b:c") would both
        // produce "dm:a:b:c".
        assert_ne!(derive_topic("a:b", "c"), derive_topic("a", "b:c"));
    }
}
