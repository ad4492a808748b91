//! `get`, `post`, `put`, `delete` and `cache-key` commands.

use std::time::Duration;

use super::Context;
use super::args::{BodyArgs, CacheKeyArgs, GetArgs, parse_params};
use crate::core::request::{Method, RequestDescriptor, cache_key};
use crate::error::Result;

/// Build the descriptor for `sfc get`.
///
/// # Errors
///
/// Returns error for malformed `-p` arguments.
pub fn get_descriptor(args: &GetArgs) -> Result<RequestDescriptor> {
    let mut descriptor = RequestDescriptor::get(&args.path);
    descriptor.params = parse_params(&args.params)?;
    if let Some(ttl_ms) = args.cache_ttl {
        descriptor = descriptor.cached_for(Duration::from_millis(ttl_ms));
    }
    if let Some(retry) = args.retry {
        descriptor = descriptor.with_retry(retry);
    }
    Ok(descriptor)
}

/// Build the descriptor for `sfc post|put|delete`.
///
/// # Errors
///
/// Returns error for a malformed body or `-p` arguments.
pub fn body_descriptor(method: Method, args: &BodyArgs) -> Result<RequestDescriptor> {
    let mut descriptor = RequestDescriptor::new(method, &args.path);
    descriptor.params = parse_params(&args.params)?;
    descriptor.body = args.body()?;
    Ok(descriptor)
}

/// # Errors
///
/// Returns the request error after retries and error interceptors.
pub async fn execute_get(ctx: &Context, args: &GetArgs) -> Result<()> {
    let descriptor = get_descriptor(args)?;
    let client = ctx.client(args.raw).await?;
    let body = client.request(descriptor).await;
    client.shutdown();
    ctx.print_json(&body?)
}

/// # Errors
///
/// Returns the request error after error interceptors.
pub async fn execute_with_body(ctx: &Context, method: Method, args: &BodyArgs) -> Result<()> {
    let descriptor = body_descriptor(method, args)?;
    let client = ctx.client(args.raw).await?;
    let body = client.request(descriptor).await;
    client.shutdown();
    ctx.print_json(&body?)
}

/// Print the cache key a request would use. Mutating methods are never
/// cached, but their key is still shown.
///
/// # Errors
///
/// Returns error for an unknown method or malformed `-p` arguments.
pub fn execute_cache_key(args: &CacheKeyArgs) -> Result<()> {
    let method = args.method()?;
    let params = parse_params(&args.params)?;
    println!("{}", cache_key(method, &args.path, params.as_ref()));
    Ok(())
}
