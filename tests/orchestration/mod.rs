//! Step definitions, fixtures, and scenarios for resource orchestration.

mod bdd_steps;
mod scenarios;
mod test_helpers;
