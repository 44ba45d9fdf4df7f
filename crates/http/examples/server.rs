use std::sync::Arc;

use http::{HeaderValue, StatusCode, header};
use nio_http::buffer::BufferPool;
use nio_http::connection::HttpOpenListener;
use nio_http::exchange::{BlockingPool, HttpServerExchange};
use nio_http::handler::{Handler, into_dyn, make_handler};
use nio_http::protocol::{HandlerError, HttpOptions};
use tokio::net::TcpListener;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    info!(port = 8080, "start listening");
    let tcp_listener = match TcpListener::bind("127.0.0.1:8080").await {
        Ok(tcp_listener) => tcp_listener,
        Err(e) => {
            error!(cause = %e, "bind server error");
            return;
        }
    };

    let options = HttpOptions::default().with_buffer_pipelined_data(true);
    let open_listener = HttpOpenListener::with_options(into_dyn(SimpleHandler), BufferPool::default(), options);

    loop {
        let (tcp_stream, _remote_addr) = match tcp_listener.accept().await {
            Ok(stream_and_addr) => stream_and_addr,
            Err(e) => {
                warn!(cause = %e, "failed to accept");
                continue;
            }
        };
        open_listener.spawn(tcp_stream);
    }
}

/// `/echo` returns the request body, `/slow` runs on the blocking pool,
/// anything else says hello.
struct SimpleHandler;

impl Handler for SimpleHandler {
    async fn handle_request(&self, exchange: &mut HttpServerExchange) -> Result<(), HandlerError> {
        let path = exchange.request().request_path().to_owned();
        match path.as_str() {
            "/echo" => {
                let mut body = Vec::new();
                exchange.request_channel().map_err(HandlerError::failed)?.read_to_end(&mut body).await.map_err(HandlerError::failed)?;
                exchange.send(body).await.map_err(HandlerError::failed)
            }
            "/slow" => {
                let slow = make_handler(|exchange| {
                    Box::pin(async move {
                        std::thread::sleep(std::time::Duration::from_millis(100));
                        exchange.send("done\r\n").await.map_err(HandlerError::failed)
                    })
                });
                exchange.dispatch(Some(Arc::new(BlockingPool)), into_dyn(slow));
                Ok(())
            }
            _ => {
                exchange.set_status(StatusCode::OK).map_err(HandlerError::failed)?;
                exchange.response_headers_mut().insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
                exchange.send("Hello World!\r\n").await.map_err(HandlerError::failed)
            }
        }
    }
}
