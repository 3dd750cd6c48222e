//! issuelink: create, link and track GitHub issues from document text.
//!
//! | Module     | Role                                                        |
//! |------------|-------------------------------------------------------------|
//! | `github`   | issue API client trait, REST client, in-memory mock         |
//! | `auth`     | session lookup and per-repository token resolution          |
//! | `server`   | axum routes proxying issue CRUD with the retry policy       |
//! | `document` | document tree, issue-link marks, markup, text ranges        |
//! | `sync`     | issue status reconciliation                                 |
//! | `backend`  | editor-side issue backends (HTTP routes or direct client)   |
//! | `editor`   | headless editor session and its issue actions               |
//! | `config`   | `issuelink.toml` loading, env overrides, validation         |
//! | `logging`  | tracing subscriber setup                                    |

pub mod auth;
pub mod backend;
pub mod config;
pub mod document;
pub mod editor;
pub mod errors;
pub mod github;
pub mod logging;
pub mod server;
pub mod sync;
