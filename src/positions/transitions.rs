use super::types::{ EpisodeMark, EpisodeState, TrackedPosition };
use crate::config::ClosePolicy;
use crate::signals::{ Stage, StageSignal };
use chrono::NaiveDate;

/// What one signal does to a ticker's episode history
#[derive(Debug, Clone, PartialEq)]
pub enum PositionTransition {
    Open {
        mark: EpisodeMark,
    },
    Close {
        episode_id: i64,
        mark: EpisodeMark,
    },
    Ignore(IgnoreReason),
}

/// Why a signal left the history unchanged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Tracked stage while an episode is already open
    DuplicateOpenSignal,
    /// Untracked stage with no open episode
    NoPositionToClose,
    /// Untracked stage that the close policy does not act on
    StageDoesNotClose,
    /// A write was needed but neither an observed nor a crossover price exists
    MissingPrice,
    /// Observation dated before the episode boundary it would create
    StaleSignal,
}

impl IgnoreReason {
    /// Reasons that point at bad input rather than a normal no-op
    pub fn is_warning(&self) -> bool {
        matches!(self, IgnoreReason::MissingPrice | IgnoreReason::StaleSignal)
    }
}

impl std::fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            IgnoreReason::DuplicateOpenSignal => "duplicate open signal",
            IgnoreReason::NoPositionToClose => "no open position",
            IgnoreReason::StageDoesNotClose => "stage does not close under policy",
            IgnoreReason::MissingPrice => "missing price",
            IgnoreReason::StaleSignal => "stale signal",
        };
        write!(f, "{}", text)
    }
}

/// Decide the transition for `signal` given the ticker's latest episode
///
/// Pure function of its inputs; the caller runs it inside the ticker's
/// transaction and resolves `observed_on` beforehand.
pub fn decide(
    latest: Option<&TrackedPosition>,
    signal: &StageSignal,
    observed_on: NaiveDate,
    policy: ClosePolicy
) -> PositionTransition {
    let state = EpisodeState::of(latest);

    match (state, latest) {
        (EpisodeState::Open, Some(episode)) => {
            if signal.stage.is_tracked() {
                return PositionTransition::Ignore(IgnoreReason::DuplicateOpenSignal);
            }
            if !policy.closes_on(signal.stage) {
                return PositionTransition::Ignore(IgnoreReason::StageDoesNotClose);
            }
            if observed_on < episode.open_date {
                return PositionTransition::Ignore(IgnoreReason::StaleSignal);
            }
            match mark_for(signal, observed_on) {
                Some(mark) => PositionTransition::Close { episode_id: episode.id, mark },
                None => PositionTransition::Ignore(IgnoreReason::MissingPrice),
            }
        }
        (_, latest) => {
            if !signal.stage.is_tracked() {
                return PositionTransition::Ignore(IgnoreReason::NoPositionToClose);
            }
            let last_close = latest.and_then(|episode| episode.close_date);
            if matches!(last_close, Some(closed_on) if observed_on < closed_on) {
                return PositionTransition::Ignore(IgnoreReason::StaleSignal);
            }
            match mark_for(signal, observed_on) {
                Some(mark) => PositionTransition::Open { mark },
                None => PositionTransition::Ignore(IgnoreReason::MissingPrice),
            }
        }
    }
}

fn mark_for(signal: &StageSignal, observed_on: NaiveDate) -> Option<EpisodeMark> {
    let price = signal.effective_price()?;
    Some(
        EpisodeMark::new(observed_on, price).with_crossover(
            signal.crossover_date,
            signal.crossover_price
        )
    )
}

impl ClosePolicy {
    /// Whether an untracked stage closes an open episode under this policy
    pub fn closes_on(&self, stage: Stage) -> bool {
        match self {
            ClosePolicy::AnyOtherStage => !stage.is_tracked(),
            ClosePolicy::ToppingOnly => stage == Stage::Topping,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn episode(open_date: NaiveDate, close_date: Option<NaiveDate>) -> TrackedPosition {
        TrackedPosition {
            id: 7,
            ticker: "XYZ".to_string(),
            open_date,
            close_date,
            open_price: 1.0,
            close_price: close_date.map(|_| 0.8),
            open_crossover_date: None,
            open_crossover_price: None,
            close_crossover_date: None,
            close_crossover_price: None,
        }
    }

    fn signal(stage: Stage, price: f64) -> StageSignal {
        StageSignal::new(stage).with_price(price)
    }

    #[test]
    fn test_no_position() {
        let today = date(2025, 5, 21);
        let opened = decide(None, &signal(Stage::Advancing, 1.0), today, ClosePolicy::default());
        assert_eq!(opened, PositionTransition::Open { mark: EpisodeMark::new(today, 1.0) });

        for stage in [Stage::Basing, Stage::Topping, Stage::Declining] {
            assert_eq!(
                decide(None, &signal(stage, 1.0), today, ClosePolicy::default()),
                PositionTransition::Ignore(IgnoreReason::NoPositionToClose)
            );
        }
    }

    #[test]
    fn test_open_episode() {
        let open = episode(date(2025, 5, 21), None);
        let today = date(2025, 6, 2);

        assert_eq!(
            decide(Some(&open), &signal(Stage::Advancing, 1.1), today, ClosePolicy::default()),
            PositionTransition::Ignore(IgnoreReason::DuplicateOpenSignal)
        );

        for stage in [Stage::Basing, Stage::Topping, Stage::Declining] {
            assert_eq!(
                decide(Some(&open), &signal(stage, 0.8), today, ClosePolicy::default()),
                PositionTransition::Close { episode_id: 7, mark: EpisodeMark::new(today, 0.8) }
            );
        }
    }

    #[test]
    fn test_closed_episode_reopens_on_tracked_stage() {
        let closed = episode(date(2025, 5, 21), Some(date(2025, 6, 2)));
        let today = date(2025, 6, 10);

        assert!(
            matches!(
                decide(Some(&closed), &signal(Stage::Advancing, 0.9), today, ClosePolicy::default()),
                PositionTransition::Open { .. }
            )
        );
        assert_eq!(
            decide(Some(&closed), &signal(Stage::Declining, 0.5), today, ClosePolicy::default()),
            PositionTransition::Ignore(IgnoreReason::NoPositionToClose)
        );
    }

    #[test]
    fn test_topping_only_policy() {
        let open = episode(date(2025, 5, 21), None);
        let today = date(2025, 6, 2);

        assert_eq!(
            decide(Some(&open), &signal(Stage::Declining, 0.8), today, ClosePolicy::ToppingOnly),
            PositionTransition::Ignore(IgnoreReason::StageDoesNotClose)
        );
        assert!(
            matches!(
                decide(Some(&open), &signal(Stage::Topping, 0.8), today, ClosePolicy::ToppingOnly),
                PositionTransition::Close { .. }
            )
        );
    }

    #[test]
    fn test_crossover_price_used_when_no_observed_price() {
        let today = date(2025, 5, 21);
        let crossover = StageSignal::new(Stage::Advancing).with_crossover(date(2025, 5, 20), 4.71);

        match decide(None, &crossover, today, ClosePolicy::default()) {
            PositionTransition::Open { mark } => {
                assert_eq!(mark.price, 4.71);
                assert_eq!(mark.date, today);
                assert_eq!(mark.crossover_date, Some(date(2025, 5, 20)));
            }
            other => panic!("expected open, got {:?}", other),
        }

        assert_eq!(
            decide(None, &StageSignal::new(Stage::Advancing), today, ClosePolicy::default()),
            PositionTransition::Ignore(IgnoreReason::MissingPrice)
        );
    }

    #[test]
    fn test_stale_signals_ignored() {
        let open = episode(date(2025, 5, 21), None);
        assert_eq!(
            decide(Some(&open), &signal(Stage::Topping, 0.8), date(2025, 5, 1), ClosePolicy::default()),
            PositionTransition::Ignore(IgnoreReason::StaleSignal)
        );

        let closed = episode(date(2025, 5, 21), Some(date(2025, 6, 2)));
        assert_eq!(
            decide(Some(&closed), &signal(Stage::Advancing, 0.9), date(2025, 6, 1), ClosePolicy::default()),
            PositionTransition::Ignore(IgnoreReason::StaleSignal)
        );

        // Same-day close and reopen are allowed
        assert!(
            matches!(
                decide(Some(&closed), &signal(Stage::Advancing, 0.9), date(2025, 6, 2), ClosePolicy::default()),
                PositionTransition::Open { .. }
            )
        );
    }
}
