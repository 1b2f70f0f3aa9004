//! Enumerates the IPv4 space in a shuffled order.

use std::net::Ipv4Addr;

use exclude::ExclusionSet;

/// Multiplier and increment from Numerical Recipes. With modulus 2^32
/// these satisfy the Hull-Dobell criteria, so the recurrence visits every
/// 32-bit value exactly once per period.
const LCG_MULTIPLIER: u32 = 1_664_525;
const LCG_INCREMENT: u32 = 1_013_904_223;

/// Walks the full 32-bit address space in linear congruential order,
/// skipping excluded blocks, and ends after one whole period.
///
/// Visiting addresses in a permuted order spreads the sweep across the
/// Internet instead of marching through one network at a time, which keeps
/// the load on any single operator low and avoids spending long stretches
/// inside blackholed regions. The LCG needs constant memory where an
/// explicit shuffle of the address space would need 16 GiB.
pub struct AddressGenerator<'a> {
    excluded: &'a ExclusionSet,
    state: u32,
    finished: bool,
}

impl<'a> AddressGenerator<'a> {
    pub fn new(excluded: &'a ExclusionSet) -> AddressGenerator<'a> {
        AddressGenerator {
            excluded,
            state: 0,
            finished: false,
        }
    }
}

impl<'a> Iterator for AddressGenerator<'a> {
    type Item = Ipv4Addr;

    fn next(&mut self) -> Option<Ipv4Addr> {
        if self.finished {
            return None;
        }
        loop {
            self.state = self
                .state
                .wrapping_mul(LCG_MULTIPLIER)
                .wrapping_add(LCG_INCREMENT);
            // The walk started at zero, so landing back on it means the
            // whole period has been covered. This must be checked before
            // the exclusion test: zero sits inside an excluded block on any
            // sane list and would otherwise be skipped straight past.
            if self.state == 0 {
                self.finished = true;
                return None;
            }
            if !self.excluded.contains(self.state) {
                return Some(Ipv4Addr::from(self.state));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::iter;

    use exclude::Subnet;

    use super::*;

    fn empty_set() -> ExclusionSet {
        iter::empty().collect()
    }

    #[test]
    fn first_step_is_the_increment() {
        // State 0 steps to the bare increment, yielded big-endian.
        let excluded = empty_set();
        let mut gen = AddressGenerator::new(&excluded);
        assert_eq!(gen.next(), Some(Ipv4Addr::new(60, 110, 243, 95)));
        assert_eq!(u32::from(Ipv4Addr::new(60, 110, 243, 95)), LCG_INCREMENT);
    }

    #[test]
    fn no_duplicates_in_a_long_sample() {
        let excluded = empty_set();
        let mut seen = HashSet::new();
        for addr in AddressGenerator::new(&excluded).take(1_000_000) {
            assert!(seen.insert(u32::from(addr)), "repeated {}", addr);
            assert_ne!(u32::from(addr), 0);
        }
        assert_eq!(seen.len(), 1_000_000);
    }

    #[test]
    fn yields_respect_exclusions() {
        let excluded: ExclusionSet = vec![
            Subnet::new(Ipv4Addr::new(10, 0, 0, 0), 8).unwrap(),
            Subnet::new(Ipv4Addr::new(224, 0, 0, 0), 4).unwrap(),
        ]
        .into_iter()
        .collect();
        for addr in AddressGenerator::new(&excluded).take(200_000) {
            // The yielded value is big-endian; compare in host order.
            assert!(!excluded.contains(u32::from(addr)), "yielded {}", addr);
            assert_ne!(addr.octets()[0], 10);
            assert!(addr.octets()[0] < 224 || addr.octets()[0] >= 240);
        }
    }

    #[test]
    fn exhaustion_is_idempotent() {
        // Jump the generator to the state whose successor is zero rather
        // than walking the whole period. The multiplier is odd, so its
        // inverse mod 2^32 exists; five Newton steps converge.
        let mut inverse: u32 = 1;
        for _ in 0..5 {
            inverse = inverse.wrapping_mul(2u32.wrapping_sub(LCG_MULTIPLIER.wrapping_mul(inverse)));
        }
        assert_eq!(LCG_MULTIPLIER.wrapping_mul(inverse), 1);
        let last = 0u32
            .wrapping_sub(LCG_INCREMENT)
            .wrapping_mul(inverse);
        assert_eq!(
            last.wrapping_mul(LCG_MULTIPLIER).wrapping_add(LCG_INCREMENT),
            0
        );

        let excluded = empty_set();
        let mut gen = AddressGenerator::new(&excluded);
        gen.state = last;
        assert_eq!(gen.next(), None);
        assert!(gen.finished);
        assert_eq!(gen.next(), None);
        assert_eq!(gen.next(), None);
    }
}
