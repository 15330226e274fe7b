//! Damage degradation and tire grip.

/// Damage is clamped to `0..=MAX_DAMAGE`.
pub const MAX_DAMAGE: f32 = 100.0;

/// Grip factors are floored here so the product stays positive.
const MIN_GRIP_FACTOR: f32 = 0.01;

/// Multiplier applied to power and top speed at a given damage level.
///
/// Full damage halves both.
#[inline]
pub fn degradation(damage: f32) -> f32 {
    1.0 - damage.clamp(0.0, MAX_DAMAGE) / 200.0
}

/// Base vs. effective engine power and top speed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Performance {
    base_power: f32,     // N
    base_max_speed: f32, // m/s
    damage: f32,
    power: f32,
    max_speed: f32,
}

impl Performance {
    pub fn new(base_power: f32, base_max_speed: f32) -> Self {
        let mut p = Self {
            base_power: base_power.max(0.0),
            base_max_speed: base_max_speed.max(0.0),
            damage: 0.0,
            power: 0.0,
            max_speed: 0.0,
        };
        p.recompute();
        p
    }

    pub fn damage(&self) -> f32 {
        self.damage
    }

    pub fn base_power(&self) -> f32 {
        self.base_power
    }

    pub fn base_max_speed(&self) -> f32 {
        self.base_max_speed
    }

    /// Effective thrust at full throttle.
    pub fn engine_power(&self) -> f32 {
        self.power
    }

    /// Effective top speed (m/s).
    pub fn max_speed(&self) -> f32 {
        self.max_speed
    }

    /// Adds damage, clamped to `MAX_DAMAGE`. Negative or non-finite amounts
    /// are ignored so damage never decreases here. Returns the new total.
    pub fn add_damage(&mut self, amount: f32) -> f32 {
        if amount.is_finite() && amount > 0.0 {
            self.damage = (self.damage + amount).min(MAX_DAMAGE);
            self.recompute();
        }
        self.damage
    }

    pub fn repair(&mut self) {
        self.damage = 0.0;
        self.recompute();
    }

    /// Engine upgrade: scales the undamaged power.
    pub fn scale_base_power(&mut self, factor: f32) {
        if factor.is_finite() && factor > 0.0 {
            self.base_power *= factor;
            self.recompute();
        }
    }

    fn recompute(&mut self) {
        let k = degradation(self.damage);
        self.power = self.base_power * k;
        self.max_speed = self.base_max_speed * k;
    }
}

/// Grip as `base * weather * upgrade`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Grip {
    base: f32,
    weather: f32,
    upgrade: f32,
}

impl Grip {
    pub fn new(base: f32) -> Self {
        Self {
            base: positive(base),
            weather: 1.0,
            upgrade: 1.0,
        }
    }

    /// Replaces the ambient (weather) factor.
    pub fn set_weather(&mut self, factor: f32) {
        self.weather = positive(factor);
    }

    /// Stacks a permanent tire upgrade on top of previous ones.
    pub fn apply_upgrade(&mut self, factor: f32) {
        self.upgrade *= positive(factor);
    }

    pub fn weather(&self) -> f32 {
        self.weather
    }

    pub fn upgrade(&self) -> f32 {
        self.upgrade
    }

    pub fn effective(&self) -> f32 {
        self.base * self.weather * self.upgrade
    }
}

#[inline]
fn positive(v: f32) -> f32 {
    if v.is_finite() { v.max(MIN_GRIP_FACTOR) } else { 1.0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn damage_clamps_at_one_hundred() {
        let mut p = Performance::new(1000.0, 20.0);
        p.add_damage(60.0);
        p.add_damage(60.0);
        assert_eq!(p.damage(), 100.0);
        assert!((p.engine_power() - 500.0).abs() < 1e-3);
        assert!((p.max_speed() - 10.0).abs() < 1e-4);
    }

    #[test]
    fn negative_damage_is_ignored() {
        let mut p = Performance::new(1000.0, 20.0);
        p.add_damage(30.0);
        p.add_damage(-10.0);
        p.add_damage(f32::NAN);
        assert_eq!(p.damage(), 30.0);
    }

    #[test]
    fn repair_restores_upgraded_baseline() {
        let mut p = Performance::new(1000.0, 20.0);
        p.scale_base_power(1.2);
        p.add_damage(80.0);
        p.repair();
        assert_eq!(p.damage(), 0.0);
        assert!((p.engine_power() - 1200.0).abs() < 1e-3);
        assert_eq!(p.max_speed(), 20.0);
    }

    #[test]
    fn grip_composes_multiplicatively() {
        let mut g = Grip::new(1.0);
        g.set_weather(0.65);
        g.apply_upgrade(1.3);
        assert!((g.effective() - 0.845).abs() < 1e-6);

        // Weather replaces, upgrades stack.
        g.set_weather(0.5);
        g.apply_upgrade(1.1);
        assert!((g.effective() - 0.5 * 1.3 * 1.1).abs() < 1e-6);
    }

    proptest! {
        #[test]
        fn power_never_increases_with_damage(d1 in 0.0f32..=100.0, d2 in 0.0f32..=100.0) {
            let (lo, hi) = if d1 <= d2 { (d1, d2) } else { (d2, d1) };
            let mut a = Performance::new(90_000.0, 20.0);
            let mut b = a;
            a.add_damage(lo);
            b.add_damage(hi);
            prop_assert!(b.engine_power() <= a.engine_power());
            prop_assert!(b.max_speed() <= a.max_speed());

            b.repair();
            prop_assert_eq!(b.engine_power(), 90_000.0);
        }

        #[test]
        fn grip_is_product_and_positive(
            base in 0.1f32..3.0,
            w in 0.4f32..=1.0,
            u in 0.5f32..2.0,
        ) {
            let mut g = Grip::new(base);
            g.set_weather(w);
            g.apply_upgrade(u);
            let expected = base * w * u;
            prop_assert!((g.effective() - expected).abs() <= expected * 1e-5);
            prop_assert!(g.effective() > 0.0);
        }

        #[test]
        fn damage_sequence_stays_bounded(amounts in prop::collection::vec(-50.0f32..80.0, 0..20)) {
            let mut p = Performance::new(1.0, 1.0);
            let mut last = 0.0;
            for a in amounts {
                let d = p.add_damage(a);
                prop_assert!((0.0..=MAX_DAMAGE).contains(&d));
                prop_assert!(d >= last);
                last = d;
            }
        }
    }
}
