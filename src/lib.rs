//! # Project Cards
//!
//! A searchable catalog of construction project cards backed by a
//! spreadsheet.
//!
//! Project Cards periodically pulls an `.xlsx` workbook, normalizes each
//! data row into a [`ProjectRecord`](models::ProjectRecord) with its
//! responsible persons, document links and indicator table, replaces the
//! stored collection with the result, and serves fuzzy federated search and
//! basic CRUD through a CLI and an HTTP API.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌──────────┐
//! │  Workbook   │──▶│  Normalize   │──▶│  Store   │
//! │ http / file │   │ rows→records │   │  SQLite  │
//! └─────────────┘   └──────────────┘   └────┬─────┘
//!                                           │
//!                      ┌────────────────────┤
//!                      ▼                    ▼
//!                 ┌──────────┐        ┌──────────┐
//!                 │   CLI    │        │   HTTP   │──▶ row webhook
//!                 │ (pcards) │        │   API    │
//!                 └──────────┘        └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! pcards init                   # create database
//! pcards sync                   # ingest the configured workbook
//! pcards search "ivanov"        # fuzzy search
//! pcards serve                  # start HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`xlsx`] | Workbook reader |
//! | [`cell`] | Cell text and date conversion |
//! | [`subrecord`] | Delimited person and link cells |
//! | [`indicators`] | Indicator JSON cells |
//! | [`normalize`] | Row to record mapping |
//! | [`ingest`] | Fetch, normalize and replace cycle |
//! | [`query`] | Composite fuzzy query |
//! | [`store`] | Record storage backends |
//! | [`search`] | Search entry points |
//! | [`notify`] | Row webhook for created projects |
//! | [`server`] | HTTP API |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod cell;
pub mod config;
pub mod db;
pub mod indicators;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod normalize;
pub mod notify;
pub mod projects;
pub mod query;
pub mod search;
pub mod server;
pub mod store;
pub mod subrecord;
pub mod xlsx;
