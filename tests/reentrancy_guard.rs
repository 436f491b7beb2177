#![cfg(test)]

// Map-level reentrancy: callbacks that run under a partition lock.
use sharded_map::ShardedMap;

// A for_each callback writing into the same map would deadlock on the
// partition lock; debug builds panic instead and release the lock.
#[cfg(debug_assertions)]
#[test]
fn writing_from_for_each_callback_panics_in_debug() {
    let m = ShardedMap::new();
    m.set("a", 1);
    let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        m.for_each(|k, v| m.set(format!("{k}-copy"), *v));
    }));
    assert!(res.is_err());
    assert_eq!(m.count(), 1);
    m.set("b", 2);
    assert_eq!(m.count(), 2);
}

// Two different maps may be nested freely.
#[test]
fn combinator_may_use_a_different_map() {
    let totals = ShardedMap::new();
    let prices = ShardedMap::new();
    prices.set("apple", 3);
    let got = totals.update_or_insert("apple", 2, |_, cur, qty| {
        cur.copied().unwrap_or(0) + qty * prices.get("apple").unwrap_or(0)
    });
    assert_eq!(got, 6);
}
