//! Step definitions, fixtures, and scenarios for batch execution.

mod bdd_steps;
mod scenarios;
mod test_helpers;
