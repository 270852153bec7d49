//! Generated gRPC stubs, one module per `.proto` package. Ground: the
//! `tonic::include_proto!` idiom used for generated service code
//! throughout the gRPC-shaped examples in the retrieval pack.

pub mod registry {
    tonic::include_proto!("registry");
}

pub mod user {
    tonic::include_proto!("user");
}

pub mod config {
    tonic::include_proto!("config");
}

pub mod agent {
    tonic::include_proto!("agent");
}
