//! Product Catalog Command-Line Client
//!
//! Exercises every RPC of the product catalog service.
//!
//! # Usage
//!
//! ```bash
//! product-catalog-client product-types aws
//! product-catalog-client products aws compute
//! product-catalog-client ingest aws compute --count 12 --interval-ms 400
//! product-catalog-client chat hello there
//! ```

use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use product_catalog_service::domain::catalog::generate_short_url;
use product_catalog_service::proto::product_service_client::ProductServiceClient;
use product_catalog_service::proto::{
    AdminClientRequestProducts, ChatMessage, ClientRequestProducts, ClientRequestType, ProdsPrep,
};
use rand::Rng;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::Request;
use tonic::transport::Channel;

/// Characters random product titles are drawn from.
const TITLE_ALPHABET: &[u8] = b"3ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Length of generated product titles.
const TITLE_LEN: usize = 3;

/// Url attached to ingested products.
const INGEST_URL: &str = "sample Url";

#[derive(Debug, Parser)]
#[command(name = "product-catalog-client", about = "Product catalog gRPC client")]
struct Cli {
    /// Server host.
    #[arg(long, default_value = "127.0.0.1")]
    addr: String,

    /// Server port.
    #[arg(long, default_value_t = 8080)]
    port: u16,

    /// Deadline attached to every call, in seconds.
    #[arg(long, default_value_t = 3600)]
    timeout_secs: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List a vendor's product types.
    ProductTypes {
        /// Vendor name.
        vendor: String,
    },
    /// Stream a vendor's products of one type.
    Products {
        /// Vendor name.
        vendor: String,
        /// Product type.
        product_type: String,
    },
    /// Submit random products as an admin.
    Ingest {
        /// Vendor name.
        vendor: String,
        /// Product type.
        product_type: String,
        /// Number of products to submit.
        #[arg(long, default_value_t = 12)]
        count: usize,
        /// Pause between submissions in milliseconds.
        #[arg(long, default_value_t = 400)]
        interval_ms: u64,
    },
    /// Send chat messages and print the replies.
    Chat {
        /// Messages to send.
        #[arg(required = true)]
        messages: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let endpoint = format!("http://{}:{}", cli.addr, cli.port);
    let timeout = Duration::from_secs(cli.timeout_secs);

    let mut client = ProductServiceClient::connect(endpoint.clone())
        .await
        .with_context(|| format!("failed to connect to {endpoint}"))?;

    match cli.command {
        Command::ProductTypes { vendor } => product_types(&mut client, vendor, timeout).await,
        Command::Products {
            vendor,
            product_type,
        } => products(&mut client, vendor, product_type, timeout).await,
        Command::Ingest {
            vendor,
            product_type,
            count,
            interval_ms,
        } => {
            let interval = Duration::from_millis(interval_ms);
            ingest(&mut client, vendor, product_type, count, interval, timeout).await
        }
        Command::Chat { messages } => chat(&mut client, messages, timeout).await,
    }
}

fn with_timeout<T>(message: T, timeout: Duration) -> Request<T> {
    let mut request = Request::new(message);
    request.set_timeout(timeout);
    request
}

async fn product_types(
    client: &mut ProductServiceClient<Channel>,
    vendor: String,
    timeout: Duration,
) -> anyhow::Result<()> {
    let response = client
        .get_vendor_product_types(with_timeout(
            ClientRequestType {
                vendor: vendor.clone(),
            },
            timeout,
        ))
        .await
        .context("GetVendorProductTypes failed")?;

    println!(
        "{vendor} cloud products type are: {}",
        response.into_inner().product_type
    );
    Ok(())
}

async fn products(
    client: &mut ProductServiceClient<Channel>,
    vendor: String,
    product_type: String,
    timeout: Duration,
) -> anyhow::Result<()> {
    let mut stream = client
        .get_vendor_products(with_timeout(
            ClientRequestProducts {
                vendor,
                product_type,
            },
            timeout,
        ))
        .await
        .context("GetVendorProducts failed")?
        .into_inner();

    while let Some(response) = stream
        .message()
        .await
        .context("product stream failed")?
    {
        let Some(product) = response.product else {
            continue;
        };
        println!(
            "Title: {}, Url: {}, ShortUrl: {}",
            product.title, product.url, product.short_url
        );
    }
    Ok(())
}

async fn ingest(
    client: &mut ProductServiceClient<Channel>,
    vendor: String,
    product_type: String,
    count: usize,
    interval: Duration,
    timeout: Duration,
) -> anyhow::Result<()> {
    if count == 0 {
        bail!("--count must be greater than zero");
    }

    let (tx, rx) = mpsc::channel(count.min(64));
    tokio::spawn(async move {
        for _ in 0..count {
            let title = random_title();
            println!("Setting product: {title}");
            let request = AdminClientRequestProducts {
                product: Some(ProdsPrep {
                    title,
                    url: INGEST_URL.to_string(),
                    short_url: generate_short_url(),
                }),
                vendor: vendor.clone(),
                product_type: product_type.clone(),
            };
            if tx.send(request).await.is_err() {
                break;
            }
            tokio::time::sleep(interval).await;
        }
    });

    let response = client
        .set_vendor_products(with_timeout(ReceiverStream::new(rx), timeout))
        .await
        .context("SetVendorProducts failed")?;

    println!("Total products set: {}", response.into_inner().count);
    Ok(())
}

async fn chat(
    client: &mut ProductServiceClient<Channel>,
    messages: Vec<String>,
    timeout: Duration,
) -> anyhow::Result<()> {
    let outbound = tokio_stream::iter(
        messages
            .into_iter()
            .map(|message_content| ChatMessage { message_content }),
    );

    let mut replies = client
        .chat_vendor_sales(with_timeout(outbound, timeout))
        .await
        .context("ChatVendorSales failed")?
        .into_inner();

    while let Some(reply) = replies.message().await.context("chat stream failed")? {
        println!("{}", reply.message_content);
    }
    Ok(())
}

fn random_title() -> String {
    let mut rng = rand::rng();
    (0..TITLE_LEN)
        .map(|_| char::from(TITLE_ALPHABET[rng.random_range(0..TITLE_ALPHABET.len())]))
        .collect()
}
