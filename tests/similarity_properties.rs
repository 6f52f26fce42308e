// tests/similarity_properties.rs
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use regwatch::quality::similarity::{normalize, similarity};

const ALPHABET: &[char] = &['a', 'b', 'C', 'd', 'É', ' ', '!', '-', '1', 'ß'];

fn random_string(rng: &mut StdRng) -> String {
    let len = rng.random_range(0..24);
    (0..len)
        .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())])
        .collect()
}

#[test]
fn reflexive_and_symmetric_on_random_strings() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    for _ in 0..500 {
        let a = random_string(&mut rng);
        let b = random_string(&mut rng);
        assert_eq!(similarity(&a, &a), 1.0, "reflexive on {a:?}");
        let ab = similarity(&a, &b);
        let ba = similarity(&b, &a);
        assert_eq!(ab, ba, "symmetric on {a:?} / {b:?}");
        assert!((0.0..=1.0).contains(&ab));
    }
}

#[test]
fn only_normalized_equality_scores_one() {
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..300 {
        let a = random_string(&mut rng);
        let b = random_string(&mut rng);
        let s = similarity(&a, &b);
        if normalize(&a) != normalize(&b) {
            assert!(s < 1.0, "{a:?} vs {b:?} scored 1.0");
        } else {
            assert_eq!(s, 1.0);
        }
    }
}

#[test]
fn documented_cases() {
    assert_eq!(similarity("FDA Guidance", "fda guidance!!!"), 1.0);
    assert_eq!(similarity("", ""), 1.0);
    assert_eq!(similarity("abc", ""), 0.0);
}
