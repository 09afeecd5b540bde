//! Built-in algorithm image resolution.
//!
//! Maps (framework, version, region) to the container registry path the
//! training service pulls from.

use ht_types::{config_error, HtResult};

/// ECR registry accounts hosting the built-in XGBoost images.
const XGBOOST_REGISTRIES: &[(&str, &str)] = &[
    ("af-south-1", "510948584623"),
    ("ap-east-1", "651117190479"),
    ("ap-northeast-1", "354813040037"),
    ("ap-northeast-2", "366743142698"),
    ("ap-northeast-3", "867004704886"),
    ("ap-south-1", "720646828776"),
    ("ap-southeast-1", "121021644041"),
    ("ap-southeast-2", "783357654285"),
    ("ca-central-1", "341280168497"),
    ("cn-north-1", "450853457545"),
    ("cn-northwest-1", "451049120500"),
    ("eu-central-1", "492215442770"),
    ("eu-north-1", "662702820516"),
    ("eu-south-1", "978288397137"),
    ("eu-west-1", "141502667606"),
    ("eu-west-2", "764974769150"),
    ("eu-west-3", "659782779980"),
    ("me-south-1", "801668240914"),
    ("sa-east-1", "737474898029"),
    ("us-east-1", "683313688378"),
    ("us-east-2", "257758044811"),
    ("us-gov-west-1", "414596584902"),
    ("us-west-1", "746614075791"),
    ("us-west-2", "246618743249"),
];

/// XGBoost container versions published by the service.
const XGBOOST_VERSIONS: &[&str] = &[
    "0.90-1", "0.90-2", "1.0-1", "1.2-1", "1.2-2", "1.3-1", "1.5-1", "1.7-1",
];

fn registry_account(region: &str) -> Option<&'static str> {
    XGBOOST_REGISTRIES
        .iter()
        .find(|(r, _)| *r == region)
        .map(|(_, account)| *account)
}

fn domain_suffix(region: &str) -> &'static str {
    if region.starts_with("cn-") {
        "amazonaws.com.cn"
    } else {
        "amazonaws.com"
    }
}

/// Resolve the image URI for a built-in algorithm.
pub fn resolve_image_uri(framework: &str, version: &str, region: &str) -> HtResult<String> {
    if framework != "xgboost" {
        return Err(config_error!(
            "unsupported framework '{}': only xgboost images are known",
            framework
        ));
    }
    if !XGBOOST_VERSIONS.contains(&version) {
        return Err(config_error!(
            "unknown xgboost version '{}', expected one of {:?}",
            version,
            XGBOOST_VERSIONS
        ));
    }
    let account = registry_account(region)
        .ok_or_else(|| config_error!("no xgboost image registry for region '{}'", region))?;

    let uri = format!(
        "{}.dkr.ecr.{}.{}/sagemaker-xgboost:{}",
        account,
        region,
        domain_suffix(region),
        version
    );
    tracing::debug!("Resolved {} {} in {} to {}", framework, version, region, uri);
    Ok(uri)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_us_east_1() {
        let uri = resolve_image_uri("xgboost", "1.7-1", "us-east-1").unwrap();
        assert_eq!(
            uri,
            "683313688378.dkr.ecr.us-east-1.amazonaws.com/sagemaker-xgboost:1.7-1"
        );
    }

    #[test]
    fn china_regions_use_cn_domain() {
        let uri = resolve_image_uri("xgboost", "1.5-1", "cn-north-1").unwrap();
        assert!(uri.ends_with(".amazonaws.com.cn/sagemaker-xgboost:1.5-1"));
    }

    #[test]
    fn rejects_unknown_inputs() {
        assert!(resolve_image_uri("lightgbm", "1.7-1", "us-east-1").is_err());
        assert!(resolve_image_uri("xgboost", "9.9-9", "us-east-1").is_err());
        let err = resolve_image_uri("xgboost", "1.7-1", "mars-north-1").unwrap_err();
        assert!(err.to_string().contains("mars-north-1"));
    }
}
