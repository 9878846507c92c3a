use chrono::NaiveDate;
use serde::{ Deserialize, Serialize };

/// Weinstein trend stage reported by the classifier
///
/// The numbering is one-directional: basing, advancing, topping, declining.
/// Only `Advancing` is tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Stage {
    Basing = 1,
    Advancing = 2,
    Topping = 3,
    Declining = 4,
}

impl Stage {
    pub fn from_number(number: u8) -> Option<Self> {
        match number {
            1 => Some(Stage::Basing),
            2 => Some(Stage::Advancing),
            3 => Some(Stage::Topping),
            4 => Some(Stage::Declining),
            _ => None,
        }
    }

    pub fn number(&self) -> u8 {
        *self as u8
    }

    /// The stage that opens a tracked episode
    pub fn is_tracked(&self) -> bool {
        *self == Stage::Advancing
    }
}

impl TryFrom<u8> for Stage {
    type Error = String;

    fn try_from(number: u8) -> Result<Self, Self::Error> {
        Stage::from_number(number).ok_or_else(|| format!("Unknown stage number: {}", number))
    }
}

impl From<Stage> for u8 {
    fn from(stage: Stage) -> Self {
        stage.number()
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "STAGE{}", self.number())
    }
}

/// One parsed classification response for a ticker
///
/// `crossover_*` come from the classifier text. `price` and `observed_on`
/// describe the observation the signal was made on (usually the last bar of
/// the price history) and are attached by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageSignal {
    pub stage: Stage,
    pub crossover_date: Option<NaiveDate>,
    pub crossover_price: Option<f64>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub observed_on: Option<NaiveDate>,
}

impl StageSignal {
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            crossover_date: None,
            crossover_price: None,
            price: None,
            observed_on: None,
        }
    }

    pub fn with_crossover(mut self, date: NaiveDate, price: f64) -> Self {
        self.crossover_date = Some(date);
        self.crossover_price = Some(price);
        self
    }

    pub fn with_price(mut self, price: f64) -> Self {
        self.price = Some(price);
        self
    }

    pub fn observed_on(mut self, date: NaiveDate) -> Self {
        self.observed_on = Some(date);
        self
    }

    /// Price to record for an open or close: the observed price, else the crossover price
    pub fn effective_price(&self) -> Option<f64> {
        self.price.or(self.crossover_price)
    }
}
