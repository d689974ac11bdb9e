//! Plugin protocol types generated from `proto/provider.proto`.

#![allow(missing_docs)]
#![allow(clippy::all)]

tonic::include_proto!("provider.v1");
