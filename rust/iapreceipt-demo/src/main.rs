// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use anyhow::{anyhow, Context as _};
use iapreceipt_common::parse_receipt_timestamp;
use iapreceipt_validation::{
    AppIdentity, DeviceIdentifier, FileReceiptSource, ReceiptValidationOptions, ReceiptValidator,
};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::str::FromStr as _;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing_subscriber::EnvFilter;

fn usage() -> &'static str {
    concat!(
        "iapreceipt-demo\n\n",
        "USAGE:\n",
        "  iapreceipt-demo validate --receipt <path> --root <der> --bundle-id <id> --version <v>\n",
        "                           --device-id <hex|uuid> [--now <YYYY-MM-DDTHH:MM:SSZ>]\n",
        "                           [--max-len <bytes>]\n\n",
        "NOTES:\n",
        "  --root is the DER encoding of the pinned root certificate.\n",
        "  --device-id accepts 32 hex digits or the 8-4-4-4-12 UUID form.\n",
        "  Set RUST_LOG=debug to trace each validation stage.\n",
    )
}

fn read_all(path: &Path) -> anyhow::Result<Vec<u8>> {
    let mut f = File::open(path).with_context(|| format!("failed to open: {}", path.display()))?;
    let mut out = Vec::new();
    f.read_to_end(&mut out)
        .with_context(|| format!("failed to read: {}", path.display()))?;
    Ok(out)
}

fn required<T>(value: Option<T>, flag: &str) -> anyhow::Result<T> {
    value.ok_or_else(|| anyhow!("missing {flag}\n\n{}", usage()))
}

fn next_value(args: &mut impl Iterator<Item = String>, flag: &str) -> anyhow::Result<String> {
    args.next().ok_or_else(|| anyhow!("{flag} needs a value\n\n{}", usage()))
}

fn format_date(value: Option<OffsetDateTime>) -> String {
    value
        .and_then(|d| d.format(&Rfc3339).ok())
        .unwrap_or_else(|| "-".to_string())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut args = std::env::args().skip(1);
    let Some(cmd) = args.next() else {
        return Err(anyhow!(usage()));
    };

    if cmd != "validate" {
        return Err(anyhow!(usage()));
    }

    let mut receipt_path: Option<PathBuf> = None;
    let mut root_path: Option<PathBuf> = None;
    let mut bundle_id: Option<String> = None;
    let mut version: Option<String> = None;
    let mut device: Option<DeviceIdentifier> = None;
    let mut now: Option<OffsetDateTime> = None;
    let mut max_len: Option<usize> = None;

    while let Some(a) = args.next() {
        match a.as_str() {
            "--receipt" => receipt_path = Some(PathBuf::from(next_value(&mut args, "--receipt")?)),
            "--root" => root_path = Some(PathBuf::from(next_value(&mut args, "--root")?)),
            "--bundle-id" => bundle_id = Some(next_value(&mut args, "--bundle-id")?),
            "--version" => version = Some(next_value(&mut args, "--version")?),
            "--device-id" => {
                let text = next_value(&mut args, "--device-id")?;
                device = Some(DeviceIdentifier::from_str(&text).context("invalid --device-id")?);
            }
            "--now" => {
                let text = next_value(&mut args, "--now")?;
                now = Some(parse_receipt_timestamp(&text).context("invalid --now")?);
            }
            "--max-len" => {
                let text = next_value(&mut args, "--max-len")?;
                max_len = Some(text.parse().context("invalid --max-len")?);
            }
            "-h" | "--help" => {
                println!("{}", usage());
                return Ok(());
            }
            other => return Err(anyhow!("Unknown arg: {other}\n\n{}", usage())),
        }
    }

    let receipt_path = required(receipt_path, "--receipt")?;
    let root_der = read_all(&required(root_path, "--root")?)?;
    let identity =
        AppIdentity::new(required(bundle_id, "--bundle-id")?, required(version, "--version")?);

    let mut options = ReceiptValidationOptions::default()
        .with_trusted_root(root_der)
        .with_app_identity(identity)
        .with_device_identifier(required(device, "--device-id")?);
    if let Some(now) = now {
        options = options.with_now(now);
    }
    if let Some(max_len) = max_len {
        options = options.with_max_receipt_len(max_len);
    }

    let result = ReceiptValidator::new(options).validate(&FileReceiptSource::new(receipt_path));

    println!("status: {} ({})", result.status.code(), result.status.message());
    println!("stage: {}", result.stage);
    for failure in &result.failures {
        match &failure.error_code {
            Some(code) => println!("failure [{code}]: {}", failure.message),
            None => println!("failure: {}", failure.message),
        }
    }

    let mut keys: Vec<_> = result.metadata.keys().collect();
    keys.sort();
    for key in keys {
        println!("meta {key} = {}", result.metadata[key]);
    }

    if !result.is_valid() {
        return Err(anyhow!("receipt validation failed: {}", result.status.code()));
    }

    let record = &result.record;
    println!("bundle: {}", record.bundle_identifier.as_deref().unwrap_or("-"));
    println!("version: {}", record.bundle_version.as_deref().unwrap_or("-"));
    println!(
        "original version: {}",
        record.original_application_version.as_deref().unwrap_or("-")
    );
    println!("created: {}", format_date(record.creation_date));
    println!("expires: {}", format_date(record.expiration_date));
    println!("purchases: {}", record.purchases.len());
    for p in &record.purchases {
        println!(
            "  {} x{} txn={} purchased={} sub_expires={} cancelled={}",
            p.product_identifier.as_deref().unwrap_or("-"),
            p.quantity.unwrap_or(0),
            p.transaction_identifier.as_deref().unwrap_or("-"),
            format_date(p.purchase_date),
            format_date(p.subscription_expiration_date),
            format_date(p.cancellation_date),
        );
    }

    Ok(())
}
