//! Cluster-aware dialing: `"host:port"` dials a single target;
//! `"h1:p1,h2:p2,…"` dials all of them with gRPC-level round-robin and
//! failover via tonic's own client-side load balancer.

use aio_core::{Error, Result};
use tonic::transport::{Channel, Endpoint};

/// Splits a dial target on `,`, trimming whitespace and dropping empty
/// entries while preserving the listed order (duplicates included).
pub fn parse_targets(target: &str) -> Vec<String> {
    target
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Builds the dial-target string: a single `host:port` passes through
/// unchanged, a comma-separated list becomes a `static:///` URI (gRPC's
/// own static-resolver scheme), and an empty target stays empty.
pub fn build(target: &str) -> String {
    let targets = parse_targets(target);
    match targets.as_slice() {
        [] => String::new(),
        [single] => single.clone(),
        many => format!("static:///{}", many.join(",")),
    }
}

fn to_endpoint(addr: &str) -> Result<Endpoint> {
    let uri = if addr.starts_with("http://") || addr.starts_with("https://") {
        addr.to_string()
    } else {
        format!("http://{addr}")
    };
    Endpoint::from_shared(uri).map_err(|e| Error::invalid_argument(format!("'{addr}' is not a dialable address: {e}")))
}

/// Connects to `target`, which may be a single `host:port` or a
/// comma-separated list dialed as one load-balanced channel.
pub async fn dial(target: &str) -> Result<Channel> {
    let targets = parse_targets(target);
    match targets.as_slice() {
        [] => Err(Error::invalid_argument("dial target is empty")),
        [single] => to_endpoint(single)?
            .connect()
            .await
            .map_err(|e| Error::unavailable(format!("connecting to '{single}': {e}"))),
        many => {
            let endpoints = many.iter().map(|a| to_endpoint(a)).collect::<Result<Vec<_>>>()?;
            Ok(Channel::balance_list(endpoints.into_iter()))
        }
    }
}
