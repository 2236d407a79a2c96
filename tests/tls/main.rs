mod common;
mod post;
mod quic;
mod tls12;
mod tls13;
