// Public library interface for actual-budget-fetch
pub mod actual;
pub mod backup;
pub mod cli_utils;
pub mod etl;
pub mod runner;
pub mod utils;
