//! Console report

use epmap::{EpmError, FaultStatus, LookupEntry, Uuid};
use std::fmt::Write;

pub fn binding_banner(host: &str, port: u16) -> String {
    format!("\nBinding to endpoint mapper: {}[{}] ...", host, port)
}

pub const QUERY_BANNER: &str = "Querying Endpoint Mapper Database...\n";

/// Two-line block for an entry with a reportable endpoint:
///
/// ```text
/// UUID: <interface> <annotation>
/// <protseq>:<host>[<port-or-pipe>]
/// ```
pub fn format_entry(host: &str, entry: &LookupEntry) -> Option<String> {
    let endpoint = entry.tower.endpoint()?;
    let interface = entry.tower.interface.unwrap_or(Uuid::NIL);

    let mut block = String::new();
    let _ = writeln!(block, "UUID: {} {}", interface, entry.annotation);
    let _ = writeln!(block, "{}", endpoint.binding(host));
    Some(block)
}

pub fn summary(count: usize) -> String {
    format!(
        "Total endpoints found: {}\n\n======= End of RPC Endpoint Mapper query response =======",
        count
    )
}

/// One-line error message, with the name of a known fault code
pub fn describe_error(err: &EpmError) -> String {
    match err {
        EpmError::RemoteFault(status) => format!(
            "the endpoint mapper rejected the call request: {}",
            FaultStatus::describe(*status)
        ),
        other => other.to_string(),
    }
}
