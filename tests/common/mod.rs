//! Canned ERDDAP responder for integration tests.
//!
//! Serves fixed responses over plain HTTP/1.1 on a local port and records
//! every request target, so tests never touch the network.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Search results for "sea surface temperature".
pub const SEARCH_CSV: &str = "\
griddap,Subset,tabledap,Make A Graph,wms,files,Title,Summary,Info,Institution,Dataset ID
https://example.org/erddap/griddap/jplMURSST41,,,,,,\"Multi-scale Ultra-high Resolution (MUR) SST Analysis\",\"A merged, multi-sensor L4 Foundation SST analysis product.\",https://example.org/erddap/info/jplMURSST41/index.html,NASA JPL,jplMURSST41
,https://example.org/erddap/tabledap/cwwcNDBCMet.subset,https://example.org/erddap/tabledap/cwwcNDBCMet,,,,\"NDBC Standard Meteorological Buoy Data\",\"The National Data Buoy Center (NDBC) distributes meteorological data from moored buoys.\",https://example.org/erddap/info/cwwcNDBCMet/index.html,NOAA NDBC,cwwcNDBCMet
";

/// ERDDAP's answer to a search without hits.
pub const NO_MATCH_BODY: &str = "Error {\n    code=404;\n    message=\"Not Found: Your query produced no matching results. (nRows = 0)\";\n}\n";

/// Metadata table for a tabular buoy dataset.
pub const BUOY_INFO_CSV: &str = "\
Row Type,Variable Name,Attribute Name,Data Type,Value
attribute,NC_GLOBAL,institution,String,\"NOAA NDBC, NOAA NMFS SWFSC ERD\"
attribute,NC_GLOBAL,summary,String,The National Data Buoy Center (NDBC) distributes meteorological data from moored buoys.
attribute,NC_GLOBAL,time_coverage_start,String,1970-02-26T20:00:00Z
attribute,NC_GLOBAL,time_coverage_end,String,2026-10-18T12:50:00Z
attribute,NC_GLOBAL,geospatial_lat_min,double,-27.7
attribute,NC_GLOBAL,geospatial_lat_max,double,70.4
attribute,NC_GLOBAL,geospatial_lon_min,double,-177.75
attribute,NC_GLOBAL,geospatial_lon_max,double,179.02
attribute,NC_GLOBAL,title,String,NDBC Standard Meteorological Buoy Data
variable,station,,String,
attribute,station,long_name,String,Station Name
variable,time,,double,
attribute,time,long_name,String,Time
attribute,time,units,String,seconds since 1970-01-01T00:00:00Z
variable,wtmp,,float,
attribute,wtmp,long_name,String,SST
attribute,wtmp,units,String,degree_C
";

/// Metadata table for a two-dimensional grid.
pub const GRID_INFO_CSV: &str = "\
Row Type,Variable Name,Attribute Name,Data Type,Value
attribute,NC_GLOBAL,title,String,Daily SST
dimension,time,,double,\"nValues=10, evenlySpaced=true\"
dimension,latitude,,float,\"nValues=5, evenlySpaced=true\"
variable,sst,,float,\"time, latitude\"
attribute,sst,units,String,degree_C
";

/// Tabular data with a units row.
pub const BUOY_DATA_CSV: &str = "\
station,time,wtmp
,UTC,degree_C
46012,2020-01-01T00:00:00Z,12.0
46012,2020-01-01T01:00:00Z,12.5
46026,2020-01-01T00:00:00Z,13.0
46026,2020-01-01T01:00:00Z,NaN
";

/// One canned response.
#[derive(Debug, Clone)]
pub struct Route {
    /// Request targets starting with this prefix get this response.
    pub prefix: String,
    /// HTTP status code.
    pub status: u16,
    /// Response body.
    pub body: String,
    /// Delay before the response is written.
    pub delay: Duration,
    /// Advertise more bytes than are sent, then hang up.
    pub cut_short: bool,
}

impl Route {
    pub fn ok(prefix: &str, body: &str) -> Self {
        Self::status(prefix, 200, body)
    }

    pub fn status(prefix: &str, status: u16, body: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            status,
            body: body.to_string(),
            delay: Duration::ZERO,
            cut_short: false,
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn cut_short(mut self) -> Self {
        self.cut_short = true;
        self
    }
}

/// A running canned server.
pub struct CannedServer {
    /// Base URL, e.g. `http://127.0.0.1:4312/erddap`.
    pub base_url: String,
    requests: Arc<Mutex<Vec<String>>>,
}

impl CannedServer {
    /// Starts serving `routes` on an ephemeral port.
    pub async fn start(routes: Vec<Route>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let routes = Arc::new(routes);

        let recorded = Arc::clone(&requests);
        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    return;
                };
                let routes = Arc::clone(&routes);
                let recorded = Arc::clone(&recorded);
                tokio::spawn(async move {
                    let target = read_request_target(&mut stream).await;
                    recorded.lock().unwrap().push(target.clone());

                    let route = routes.iter().find(|r| target.starts_with(&r.prefix));
                    let (status, body, delay, cut_short) = route.map_or_else(
                        || (404, "Error { code=404; message=\"Not Found\"; }".to_string(), Duration::ZERO, false),
                        |r| (r.status, r.body.clone(), r.delay, r.cut_short),
                    );
                    let declared_len = if cut_short { body.len() + 64 } else { body.len() };

                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    let head = format!(
                        "HTTP/1.1 {status} {}\r\nContent-Type: text/csv;charset=UTF-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                        reason(status),
                        declared_len
                    );
                    // The client may hang up early on bounded reads.
                    let _ = stream.write_all(head.as_bytes()).await;
                    let _ = stream.write_all(body.as_bytes()).await;
                    let _ = stream.shutdown().await;
                });
            }
        });

        Self {
            base_url: format!("http://{addr}/erddap"),
            requests,
        }
    }

    /// Request targets received so far, in arrival order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

async fn read_request_target(stream: &mut tokio::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0_u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
    String::from_utf8_lossy(&buf)
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or_default()
        .to_string()
}

const fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        404 => "Not Found",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}

/// An address nothing is listening on.
pub async fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}/erddap")
}
