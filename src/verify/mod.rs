pub mod action_sm;
