//! Button debouncing.
//!
//! Raw level changes come in through [`Debouncer::feed`]; a change only
//! counts once the line has held the new level for the debounce window.
//! A short press is reported as `Press` then `Release` when the button comes
//! back up. Holding past the long-press threshold reports `LongPress` right
//! away and `Release` later.

use std::time::{Duration, Instant};
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Button {
    Prev,
    Next,
    Menu,
    Back,
}

impl Button {
    pub const ALL: [Button; 4] = [Button::Prev, Button::Next, Button::Menu, Button::Back];

    fn index(self) -> usize {
        match self {
            Button::Prev => 0,
            Button::Next => 1,
            Button::Menu => 2,
            Button::Back => 3,
        }
    }
}

/// A raw level change on one button line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonEdge {
    pub button: Button,
    pub pressed: bool,
    pub at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Press,
    LongPress,
    Release,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonEvent {
    pub button: Button,
    pub kind: EventKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebounceConfig {
    pub debounce: Duration,
    pub long_press: Duration,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(30),
            long_press: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HoldState {
    Idle,
    Held { since: Instant },
    LongEmitted,
}

impl HoldState {
    fn is_down(self) -> bool {
        !matches!(self, HoldState::Idle)
    }
}

#[derive(Debug, Clone, Copy)]
struct Channel {
    state: HoldState,
    /// Level change that has not yet been stable for the debounce window.
    pending: Option<(bool, Instant)>,
}

impl Channel {
    const fn new() -> Self {
        Self {
            state: HoldState::Idle,
            pending: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Debouncer {
    config: DebounceConfig,
    channels: [Channel; 4],
}

impl Debouncer {
    pub fn new(config: DebounceConfig) -> Self {
        Self {
            config,
            channels: [Channel::new(); 4],
        }
    }

    /// Register a raw edge. Returns events that became due before it.
    pub fn feed(&mut self, edge: ButtonEdge) -> Vec<ButtonEvent> {
        let events = self.poll(edge.at);
        let channel = &mut self.channels[edge.button.index()];
        match channel.pending {
            Some((level, _)) if level == edge.pressed => {
                trace!(button = ?edge.button, "Duplicate edge");
            }
            Some(_) => {
                trace!(button = ?edge.button, "Glitch suppressed");
                channel.pending = None;
            }
            None if channel.state.is_down() == edge.pressed => {
                trace!(button = ?edge.button, "Edge matches settled level");
            }
            None => channel.pending = Some((edge.pressed, edge.at)),
        }
        events
    }

    /// Events that are due at `now`, ordered by when they happened.
    pub fn poll(&mut self, now: Instant) -> Vec<ButtonEvent> {
        let mut due: Vec<(Instant, ButtonEvent)> = Vec::new();
        for button in Button::ALL {
            let config = self.config;
            let channel = &mut self.channels[button.index()];
            let mut emit = |kind, at| due.push((at, ButtonEvent { button, kind }));

            if let Some((pressed, at)) = channel.pending {
                if now.saturating_duration_since(at) >= config.debounce {
                    channel.pending = None;
                    match (channel.state, pressed) {
                        (HoldState::Idle, true) => channel.state = HoldState::Held { since: at },
                        (HoldState::Held { since }, false) => {
                            if at.saturating_duration_since(since) >= config.long_press {
                                emit(EventKind::LongPress, since + config.long_press);
                            } else {
                                emit(EventKind::Press, at);
                            }
                            emit(EventKind::Release, at);
                            channel.state = HoldState::Idle;
                        }
                        (HoldState::LongEmitted, false) => {
                            emit(EventKind::Release, at);
                            channel.state = HoldState::Idle;
                        }
                        _ => {}
                    }
                }
            }

            if let HoldState::Held { since } = channel.state {
                let held_until = match channel.pending {
                    Some((false, released_at)) => released_at,
                    _ => now,
                };
                if held_until.saturating_duration_since(since) >= config.long_press {
                    emit(EventKind::LongPress, since + config.long_press);
                    channel.state = HoldState::LongEmitted;
                }
            }
        }
        due.sort_by_key(|(at, _)| *at);
        due.into_iter().map(|(_, event)| event).collect()
    }

    /// Earliest instant at which [`Debouncer::poll`] could produce an event.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.channels
            .iter()
            .filter_map(|channel| {
                let settle = channel.pending.map(|(_, at)| at + self.config.debounce);
                let hold = match channel.state {
                    HoldState::Held { since } => Some(since + self.config.long_press),
                    _ => None,
                };
                match (settle, hold) {
                    (Some(a), Some(b)) => Some(a.min(b)),
                    (a, b) => a.or(b),
                }
            })
            .min()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(base: Instant, offset: u64) -> Instant {
        base + Duration::from_millis(offset)
    }

    fn edge(button: Button, pressed: bool, at: Instant) -> ButtonEdge {
        ButtonEdge {
            button,
            pressed,
            at,
        }
    }

    fn kinds(events: &[ButtonEvent]) -> Vec<EventKind> {
        events.iter().map(|event| event.kind).collect()
    }

    #[test]
    fn short_press_reports_press_then_release() {
        let t0 = Instant::now();
        let mut debouncer = Debouncer::new(DebounceConfig::default());

        assert!(debouncer.feed(edge(Button::Next, true, t0)).is_empty());
        assert!(debouncer.poll(ms(t0, 40)).is_empty());
        assert!(debouncer.feed(edge(Button::Next, false, ms(t0, 120))).is_empty());
        let events = debouncer.poll(ms(t0, 160));

        assert_eq!(kinds(&events), vec![EventKind::Press, EventKind::Release]);
        assert!(events.iter().all(|event| event.button == Button::Next));
        assert!(debouncer.next_deadline().is_none());
    }

    #[test]
    fn hold_reports_long_press_once_then_release() {
        let t0 = Instant::now();
        let mut debouncer = Debouncer::new(DebounceConfig::default());
        debouncer.feed(edge(Button::Prev, true, t0));

        assert!(debouncer.poll(ms(t0, 400)).is_empty());
        assert_eq!(kinds(&debouncer.poll(ms(t0, 510))), vec![EventKind::LongPress]);
        assert!(debouncer.poll(ms(t0, 800)).is_empty());
        debouncer.feed(edge(Button::Prev, false, ms(t0, 900)));
        assert_eq!(kinds(&debouncer.poll(ms(t0, 940))), vec![EventKind::Release]);
    }

    #[test]
    fn release_before_threshold_is_not_a_long_press() {
        let t0 = Instant::now();
        let mut debouncer = Debouncer::new(DebounceConfig::default());
        debouncer.feed(edge(Button::Menu, true, t0));
        debouncer.feed(edge(Button::Menu, false, ms(t0, 480)));

        let events = debouncer.poll(ms(t0, 600));

        assert_eq!(kinds(&events), vec![EventKind::Press, EventKind::Release]);
    }

    #[test]
    fn glitches_shorter_than_window_are_dropped() {
        let t0 = Instant::now();
        let mut debouncer = Debouncer::new(DebounceConfig::default());
        debouncer.feed(edge(Button::Back, true, t0));
        debouncer.feed(edge(Button::Back, false, ms(t0, 10)));

        assert!(debouncer.poll(ms(t0, 200)).is_empty());
        assert!(debouncer.poll(ms(t0, 900)).is_empty());
        assert!(debouncer.next_deadline().is_none());
    }

    #[test]
    fn duplicate_edges_are_suppressed() {
        let t0 = Instant::now();
        let mut debouncer = Debouncer::new(DebounceConfig::default());
        debouncer.feed(edge(Button::Next, true, t0));
        debouncer.feed(edge(Button::Next, true, ms(t0, 5)));
        debouncer.feed(edge(Button::Next, true, ms(t0, 60)));
        debouncer.feed(edge(Button::Next, false, ms(t0, 100)));
        debouncer.feed(edge(Button::Next, false, ms(t0, 110)));

        let events = debouncer.poll(ms(t0, 200));

        assert_eq!(kinds(&events), vec![EventKind::Press, EventKind::Release]);
        assert!(debouncer.feed(edge(Button::Next, false, ms(t0, 300))).is_empty());
        assert!(debouncer.poll(ms(t0, 400)).is_empty());
    }

    #[test]
    fn buttons_are_independent() {
        let t0 = Instant::now();
        let mut debouncer = Debouncer::new(DebounceConfig::default());
        debouncer.feed(edge(Button::Prev, true, t0));
        debouncer.feed(edge(Button::Next, true, ms(t0, 5)));
        debouncer.feed(edge(Button::Prev, false, ms(t0, 100)));

        let events = debouncer.poll(ms(t0, 150));

        assert_eq!(
            events,
            vec![
                ButtonEvent {
                    button: Button::Prev,
                    kind: EventKind::Press
                },
                ButtonEvent {
                    button: Button::Prev,
                    kind: EventKind::Release
                },
            ]
        );
        assert_eq!(debouncer.next_deadline(), Some(ms(t0, 505)));
    }

    #[test]
    fn late_poll_reports_events_in_edge_order() {
        let t0 = Instant::now();
        let mut debouncer = Debouncer::new(DebounceConfig::default());
        debouncer.feed(edge(Button::Next, true, t0));
        debouncer.feed(edge(Button::Prev, true, ms(t0, 10)));
        debouncer.feed(edge(Button::Next, false, ms(t0, 100)));
        debouncer.feed(edge(Button::Prev, false, ms(t0, 105)));

        let events = debouncer.poll(ms(t0, 400));

        let order: Vec<(Button, EventKind)> =
            events.iter().map(|event| (event.button, event.kind)).collect();
        assert_eq!(
            order,
            vec![
                (Button::Next, EventKind::Press),
                (Button::Next, EventKind::Release),
                (Button::Prev, EventKind::Press),
                (Button::Prev, EventKind::Release),
            ]
        );
    }
}
