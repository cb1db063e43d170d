// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

//! Bit-packed per-edge attributes.
//!
//! Every edge carries a fixed-width block of `u32` words ([EdgeFlags]).
//! An [EncodingManager] assigns each registered [EncodedValue] its own bit range
//! inside that block, and the typed values read and write their range in O(1).

mod error;
mod int;
mod manager;
mod typed;

pub use error::EncodingError;
pub use int::{BitRange, IntEncodedValue};
pub use manager::{EdgeFlags, EncodedValue, EncodingManager, EncodingManagerBuilder};
pub use typed::{BooleanEncodedValue, DecimalEncodedValue, EnumEncodedValue};

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> EncodingManager {
        EncodingManager::builder()
            .add(BooleanEncodedValue::new("car_access", true).unwrap())
            .unwrap()
            .add(DecimalEncodedValue::new("car_average_speed", 5, 5.0, true).unwrap())
            .unwrap()
            .add(EnumEncodedValue::new("surface", &["missing", "asphalt", "gravel", "mud"]).unwrap())
            .unwrap()
            .add(DecimalEncodedValue::with_infinity("max_width", 7, 0.1, false).unwrap())
            .unwrap()
            .add(DecimalEncodedValue::from_int(IntEncodedValue::negated("slope", 7, 50).unwrap(), 1.0, false).unwrap())
            .unwrap()
            .build()
            .unwrap()
    }

    #[test]
    fn decimal_round_trip() {
        let em = manager();
        let speed = em.decimal("car_average_speed").unwrap();
        let mut flags = em.create_flags();

        for v in [0.0, 5.0, 50.0, 155.0] {
            speed.set_decimal(&mut flags, false, v).unwrap();
            assert_eq!(speed.get_decimal(&flags, false), v);
        }

        // Rounded to the nearest multiple of the factor
        speed.set_decimal(&mut flags, false, 52.4).unwrap();
        assert_eq!(speed.get_decimal(&flags, false), 50.0);
    }

    #[test]
    fn out_of_range_rejected() {
        let em = manager();
        let speed = em.decimal("car_average_speed").unwrap();
        let mut flags = em.create_flags();
        speed.set_decimal(&mut flags, false, 30.0).unwrap();

        assert!(matches!(
            speed.set_decimal(&mut flags, false, 160.0),
            Err(EncodingError::ValueOutOfRange { .. })
        ));
        assert!(speed.set_decimal(&mut flags, false, -5.0).is_err());
        assert!(speed.set_decimal(&mut flags, false, f64::NAN).is_err());
        assert!(speed.set_decimal(&mut flags, false, f64::INFINITY).is_err());

        // Failed writes leave the old value untouched
        assert_eq!(speed.get_decimal(&flags, false), 30.0);

        let int = IntEncodedValue::with_domain("lanes", 3, 1, 8, false).unwrap();
        let em = EncodingManager::builder().add(int).unwrap().build().unwrap();
        let lanes = em.int("lanes").unwrap();
        let mut flags = em.create_flags();
        lanes.set_int(&mut flags, false, 8).unwrap();
        assert_eq!(lanes.get_int(&flags, false), 8);
        assert!(lanes.set_int(&mut flags, false, 0).is_err());
        assert!(lanes.set_int(&mut flags, false, 9).is_err());
    }

    #[test]
    fn infinity_stored_as_max() {
        let em = manager();
        let width = em.decimal("max_width").unwrap();
        let mut flags = em.create_flags();

        // Unset limits are unrestricted, everything else starts at zero
        assert_eq!(width.get_decimal(&flags, false), f64::INFINITY);
        assert_eq!(em.decimal("slope").unwrap().get_decimal(&flags, true), 0.0);
        assert_eq!(em.decimal("car_average_speed").unwrap().get_decimal(&flags, true), 0.0);

        width.set_decimal(&mut flags, false, f64::INFINITY).unwrap();
        assert_eq!(width.get_decimal(&flags, false), f64::INFINITY);

        width.set_decimal(&mut flags, false, 2.5).unwrap();
        assert!((width.get_decimal(&flags, false) - 2.5).abs() < 1e-9);

        assert!(width.set_decimal(&mut flags, false, 12.7).is_err());
        assert!((width.max_decimal() - 12.6).abs() < 1e-9);
    }

    #[test]
    fn directions_are_independent() {
        let em = manager();
        let access = em.boolean("car_access").unwrap();
        let speed = em.decimal("car_average_speed").unwrap();
        let mut flags = em.create_flags();

        access.set_bool(&mut flags, false, true).unwrap();
        speed.set_decimal(&mut flags, false, 60.0).unwrap();
        speed.set_decimal(&mut flags, true, 20.0).unwrap();

        assert!(access.get_bool(&flags, false));
        assert!(!access.get_bool(&flags, true));
        assert_eq!(speed.get_decimal(&flags, false), 60.0);
        assert_eq!(speed.get_decimal(&flags, true), 20.0);

        let (fwd, bwd) = speed.int().ranges();
        assert_ne!(fwd, bwd);
        assert_eq!(fwd.mask & bwd.mask, 0);
    }

    #[test]
    fn reverse_flags() {
        let em = manager();
        let access = em.boolean("car_access").unwrap();
        let speed = em.decimal("car_average_speed").unwrap();
        let slope = em.decimal("slope").unwrap();
        let surface = em.enumeration("surface").unwrap();
        let mut flags = em.create_flags();

        access.set_bool(&mut flags, false, true).unwrap();
        speed.set_decimal(&mut flags, false, 60.0).unwrap();
        speed.set_decimal(&mut flags, true, 20.0).unwrap();
        slope.set_decimal(&mut flags, false, 12.0).unwrap();
        surface.set_enum(&mut flags, false, "gravel").unwrap();
        let original = flags.clone();

        em.reverse_flags(&mut flags);
        assert!(!access.get_bool(&flags, false));
        assert!(access.get_bool(&flags, true));
        assert_eq!(speed.get_decimal(&flags, false), 20.0);
        assert_eq!(speed.get_decimal(&flags, true), 60.0);
        assert_eq!(slope.get_decimal(&flags, false), -12.0);
        assert_eq!(slope.get_decimal(&flags, true), 12.0);
        assert_eq!(surface.get_name(&flags, false), "gravel");

        em.reverse_flags(&mut flags);
        assert_eq!(flags, original);
    }

    #[test]
    fn negated_in_reverse() {
        let em = manager();
        let slope = em.decimal("slope").unwrap();
        let mut flags = em.create_flags();

        slope.set_decimal(&mut flags, false, -7.0).unwrap();
        assert_eq!(slope.get_decimal(&flags, false), -7.0);
        assert_eq!(slope.get_decimal(&flags, true), 7.0);

        slope.set_decimal(&mut flags, true, 3.0).unwrap();
        assert_eq!(slope.get_decimal(&flags, false), -3.0);

        assert!(IntEncodedValue::negated("bad", 7, -1).is_err());
    }

    #[test]
    fn enum_values() {
        let em = manager();
        let surface = em.enumeration("surface").unwrap();
        let mut flags = em.create_flags();

        assert_eq!(surface.get_name(&flags, false), "missing");
        surface.set_enum(&mut flags, false, "mud").unwrap();
        assert_eq!(surface.get_index(&flags, false), 3);
        assert_eq!(surface.get_name(&flags, false), "mud");
        assert!(matches!(
            surface.set_enum(&mut flags, false, "lava"),
            Err(EncodingError::UnknownCategory { .. })
        ));
        assert!(EnumEncodedValue::new::<&str>("empty", &[]).is_err());
    }

    #[test]
    fn values_never_straddle_words() {
        let em = EncodingManager::builder()
            .add(IntEncodedValue::new("a", 30, false).unwrap())
            .unwrap()
            .add(IntEncodedValue::new("b", 5, false).unwrap())
            .unwrap()
            .add(IntEncodedValue::new("c", 32, false).unwrap())
            .unwrap()
            .build()
            .unwrap();

        let (a, _) = em.int("a").unwrap().ranges();
        let (b, _) = em.int("b").unwrap().ranges();
        let (c, _) = em.int("c").unwrap().ranges();
        assert_eq!((a.word, a.shift), (0, 0));
        assert_eq!((b.word, b.shift), (1, 0));
        assert_eq!((c.word, c.shift), (2, 0));
        assert_eq!(em.ints_per_edge(), 3);

        let mut flags = em.create_flags();
        let c = em.int("c").unwrap();
        c.set_int(&mut flags, false, i32::MAX).unwrap();
        assert_eq!(c.get_int(&flags, false), i32::MAX);
        assert_eq!(flags[0], 0);
        assert_eq!(flags[1], 0);
    }

    #[test]
    fn invalid_layouts_rejected() {
        assert!(matches!(
            IntEncodedValue::new("wide", 33, false),
            Err(EncodingError::InvalidWidth { .. })
        ));
        assert!(matches!(
            IntEncodedValue::with_domain("narrow", 2, 0, 4, false),
            Err(EncodingError::DomainTooWide { .. })
        ));
        assert!(matches!(
            DecimalEncodedValue::new("zero", 4, 0.0, false),
            Err(EncodingError::InvalidFactor { .. })
        ));

        let dup = EncodingManager::builder()
            .add(IntEncodedValue::new("x", 4, false).unwrap())
            .unwrap()
            .add(IntEncodedValue::new("x", 4, false).unwrap());
        assert!(matches!(dup, Err(EncodingError::Duplicate(_))));

        let mut a = IntEncodedValue::new("a", 8, false).unwrap();
        let mut b = IntEncodedValue::new("b", 8, false).unwrap();
        a.define_bits(0).unwrap();
        b.define_bits(4).unwrap();
        assert!(matches!(a.define_bits(8), Err(EncodingError::AlreadyDefined(_))));
        let overlap = EncodingManager::builder()
            .add(a)
            .unwrap()
            .add(b)
            .unwrap()
            .build();
        assert!(matches!(overlap, Err(EncodingError::Overlap { .. })));

        let undefined = IntEncodedValue::new("u", 4, false).unwrap();
        let mut flags = [0u32; 1];
        assert!(matches!(
            undefined.set_int(&mut flags, false, 1),
            Err(EncodingError::Undefined(_))
        ));
    }

    #[test]
    fn lookups() {
        let em = manager();
        assert!(em.has("surface"));
        assert!(matches!(em.get("lanes"), Err(EncodingError::Unknown(_))));
        assert!(matches!(
            em.decimal("surface"),
            Err(EncodingError::WrongKind { expected: "decimal", .. })
        ));
        assert_eq!(em.values().len(), 5);
    }

    #[test]
    fn layout_hash_tracks_layout() {
        let a = manager();
        let b = manager();
        assert_eq!(a.layout_hash(), b.layout_hash());

        let c = EncodingManager::builder()
            .add(BooleanEncodedValue::new("car_access", true).unwrap())
            .unwrap()
            .add(DecimalEncodedValue::new("car_average_speed", 6, 5.0, true).unwrap())
            .unwrap()
            .build()
            .unwrap();
        assert_ne!(a.layout_hash(), c.layout_hash());
    }
}
