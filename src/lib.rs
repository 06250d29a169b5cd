//! tagvote - Community tag governance
//!
//! Users propose adding or removing document tags, vote on the proposals,
//! and accepted decisions are applied to the corpus and recorded in a rule
//! ledger that is replayed whenever the tag set is regenerated.

pub mod config;
pub mod db;
pub mod models;
pub mod services;
