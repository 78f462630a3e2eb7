//! 配置校验模块
//!
//! 校验规则：
//! - 至少一个 api key，且不能为空
//! - server.bind 为合法 SocketAddr
//! - placeholder_url_base 为合法绝对 URL
//! - sink 名称非空且唯一
//! - delimited / index sink 必须提供 path
//! - delimiter 参数合法

use std::collections::HashSet;
use std::net::SocketAddr;

use contracts::{parse_delimiter, ContractError, ServiceBlueprint, SinkType};

/// 校验 ServiceBlueprint 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(blueprint: &ServiceBlueprint) -> Result<(), ContractError> {
    validate_auth(blueprint)?;
    validate_server(blueprint)?;
    validate_placeholder_base(blueprint)?;
    validate_sinks(blueprint)?;
    Ok(())
}

/// 校验 api key
fn validate_auth(blueprint: &ServiceBlueprint) -> Result<(), ContractError> {
    let keys = &blueprint.auth.api_keys;
    if keys.is_empty() {
        return Err(ContractError::config_validation(
            "auth.api_keys",
            "at least one api key is required",
        ));
    }
    for (idx, key) in keys.iter().enumerate() {
        if key.trim().is_empty() {
            return Err(ContractError::config_validation(
                format!("auth.api_keys[{}]", idx),
                "api key cannot be empty",
            ));
        }
    }
    Ok(())
}

/// 校验监听地址
fn validate_server(blueprint: &ServiceBlueprint) -> Result<(), ContractError> {
    let bind = &blueprint.server.bind;
    bind.parse::<SocketAddr>().map_err(|e| {
        ContractError::config_validation(
            "server.bind",
            format!("invalid listen address '{}': {}", bind, e),
        )
    })?;
    if blueprint.server.max_body_bytes == 0 {
        return Err(ContractError::config_validation(
            "server.max_body_bytes",
            "max_body_bytes must be > 0",
        ));
    }
    Ok(())
}

/// 校验占位 URL 前缀
fn validate_placeholder_base(blueprint: &ServiceBlueprint) -> Result<(), ContractError> {
    let base = &blueprint.validation.placeholder_url_base;
    url::Url::parse(base).map_err(|e| {
        ContractError::config_validation(
            "validation.placeholder_url_base",
            format!("'{}' is not an absolute URL: {}", base, e),
        )
    })?;
    Ok(())
}

/// 校验 sink 配置
fn validate_sinks(blueprint: &ServiceBlueprint) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for (idx, sink) in blueprint.sinks.iter().enumerate() {
        if sink.name.is_empty() {
            return Err(ContractError::config_validation(
                format!("sinks[{}].name", idx),
                "sink name cannot be empty",
            ));
        }
        if !seen.insert(sink.name.as_str()) {
            return Err(ContractError::config_validation(
                format!("sinks[name={}]", sink.name),
                "duplicate sink name",
            ));
        }
        if sink.queue_capacity == 0 {
            return Err(ContractError::config_validation(
                format!("sinks[{}].queue_capacity", sink.name),
                "queue_capacity must be > 0",
            ));
        }
        if sink.sink_type.requires_path() && sink.param("path").is_none() {
            return Err(ContractError::config_validation(
                format!("sinks[{}].params.path", sink.name),
                format!("{:?} sink requires a path", sink.sink_type),
            ));
        }
        if sink.sink_type == SinkType::Delimited {
            if let Some(delimiter) = sink.params.get("delimiter") {
                if parse_delimiter(delimiter).is_none() {
                    return Err(ContractError::config_validation(
                        format!("sinks[{}].params.delimiter", sink.name),
                        format!("unsupported delimiter '{}'", delimiter),
                    ));
                }
            }
        }
    }
    Ok(())
}
