pub mod api;
pub mod auth;
pub mod domain;
pub mod invite;
pub mod jwt;
pub mod leaderboard;
pub mod lifecycle;
pub mod path;
pub mod validation;
