//! Simulated mains zero-cross sense signal.
//!
//! Produces the raw transitions an opto-coupled sense circuit would: one
//! active pulse per crossing, with seeded timing jitter, optional contact
//! bounce on the leading edge, and outages when the mains is disconnected.

use std::collections::VecDeque;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use zero_cross_core::Ticks;

/// Virtual clock rate used by the emulator (1 tick == 1 us).
pub const TICKS_PER_SECOND: u64 = 1_000_000;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MainsProfile {
    pub frequency_hz: f64,
    /// Maximum deviation of each crossing from nominal.
    pub jitter_us: u32,
    pub pulse_width_us: u32,
    /// Chance that a leading edge rings once before settling.
    pub bounce_probability: f64,
}

impl Default for MainsProfile {
    fn default() -> Self {
        Self {
            frequency_hz: 50.0,
            jitter_us: 40,
            pulse_width_us: 800,
            bounce_probability: 0.05,
        }
    }
}

/// One raw transition of the sense input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SignalEdge {
    pub at: Ticks,
    pub level_high: bool,
}

pub struct MainsSimulator {
    profile: MainsProfile,
    rng: StdRng,
    connected: bool,
    next_crossing: Ticks,
    pending: VecDeque<SignalEdge>,
}

impl MainsSimulator {
    /// Starts connected, with the first crossing one half cycle after `start`.
    pub fn new(seed: u64, profile: MainsProfile, start: Ticks) -> Self {
        let mut simulator = Self {
            profile,
            rng: StdRng::seed_from_u64(seed),
            connected: true,
            next_crossing: 0,
            pending: VecDeque::new(),
        };
        simulator.next_crossing = start + simulator.half_cycle_us();
        simulator
    }

    pub fn profile(&self) -> MainsProfile {
        self.profile
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Nominal half cycle in microseconds.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_precision_loss,
        clippy::cast_sign_loss
    )]
    pub fn half_cycle_us(&self) -> Ticks {
        (TICKS_PER_SECOND as f64 / (2.0 * self.profile.frequency_hz)).round() as Ticks
    }

    /// Connects or disconnects the mains at `now`.
    pub fn set_connected(&mut self, connected: bool, now: Ticks) {
        if connected == self.connected {
            return;
        }
        self.connected = connected;
        self.pending.clear();
        if connected {
            self.next_crossing = now + self.half_cycle_us();
        }
    }

    /// Changes the mains frequency from the next crossing on.
    pub fn set_frequency(&mut self, frequency_hz: f64) {
        self.profile.frequency_hz = frequency_hz;
    }

    pub fn set_jitter(&mut self, jitter_us: u32) {
        self.profile.jitter_us = jitter_us;
    }

    /// Time of the next raw transition, if the mains is connected.
    pub fn next_edge_at(&mut self) -> Option<Ticks> {
        self.refill();
        self.pending.front().map(|edge| edge.at)
    }

    pub fn pop_edge(&mut self) -> Option<SignalEdge> {
        self.refill();
        self.pending.pop_front()
    }

    fn refill(&mut self) {
        if !self.connected || !self.pending.is_empty() {
            return;
        }

        let half = self.half_cycle_us();
        let bound = i64::from(self.profile.jitter_us).min(i64::try_from(half / 4).unwrap_or(0));
        let jitter = if bound > 0 {
            self.rng.gen_range(-bound..=bound)
        } else {
            0
        };
        let rise = self.next_crossing.saturating_add_signed(jitter);
        let width = Ticks::from(self.profile.pulse_width_us).max(1);

        self.pending.push_back(SignalEdge {
            at: rise,
            level_high: true,
        });
        if width > 100 && self.rng.gen_bool(self.profile.bounce_probability.clamp(0.0, 1.0)) {
            self.pending.push_back(SignalEdge {
                at: rise + 30,
                level_high: false,
            });
            self.pending.push_back(SignalEdge {
                at: rise + 60,
                level_high: true,
            });
        }
        self.pending.push_back(SignalEdge {
            at: rise + width,
            level_high: false,
        });

        self.next_crossing += half;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet() -> MainsProfile {
        MainsProfile {
            jitter_us: 0,
            bounce_probability: 0.0,
            ..MainsProfile::default()
        }
    }

    #[test]
    fn emits_one_pulse_per_half_cycle() {
        let mut mains = MainsSimulator::new(1, quiet(), 0);
        let edges: Vec<SignalEdge> = (0..4).filter_map(|_| mains.pop_edge()).collect();
        assert_eq!(
            edges,
            [
                SignalEdge { at: 10_000, level_high: true },
                SignalEdge { at: 10_800, level_high: false },
                SignalEdge { at: 20_000, level_high: true },
                SignalEdge { at: 20_800, level_high: false },
            ]
        );
    }

    #[test]
    fn outage_stops_edges_until_reconnect() {
        let mut mains = MainsSimulator::new(1, quiet(), 0);
        mains.set_connected(false, 5_000);
        assert_eq!(mains.next_edge_at(), None);

        mains.set_connected(true, 50_000);
        assert_eq!(mains.next_edge_at(), Some(60_000));
    }

    #[test]
    fn jitter_stays_within_bound_and_edges_stay_ordered() {
        let profile = MainsProfile {
            jitter_us: 200,
            bounce_probability: 0.5,
            ..MainsProfile::default()
        };
        let mut mains = MainsSimulator::new(7, profile, 0);
        let mut previous = 0;
        for index in 1..=200u64 {
            let edge = mains.pop_edge().expect("edge");
            assert!(edge.at > previous);
            previous = edge.at;
            if edge.level_high && index == 1 {
                assert!(edge.at.abs_diff(10_000) <= 200);
            }
        }
    }

    #[test]
    fn frequency_change_applies_to_following_crossings() {
        let mut mains = MainsSimulator::new(1, quiet(), 0);
        mains.set_frequency(60.0);
        assert_eq!(mains.half_cycle_us(), 8_333);
    }
}
