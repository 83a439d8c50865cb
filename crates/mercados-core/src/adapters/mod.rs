mod fake;
mod yahoo;

pub use fake::{FakeSource, FakeTicker};
pub use yahoo::{ChartData, SummaryData, YahooAuthManager, YahooSource};
