//! Access and guardrail policy documents.

use serde_json::{json, Value};

const SECRET_ACTIONS: &[&str] = &[
    "ssm:DescribeParameters",
    "ssm:GetParameter",
    "ssm:GetParametersByPath",
    "ssm:DeleteParameter*",
    "ssm:PutParameter",
];

const KEY_ACTIONS: &[&str] = &["kms:Encrypt", "kms:Decrypt", "kms:DescribeKey"];

// Everything that could read secrets or disable the key is denied to other principals.
const GUARDED_SECRET_ACTIONS: &[&str] = &[
    "ssm:DescribeParameters",
    "ssm:GetParameter*",
    "ssm:GetParametersByPath",
    "ssm:DeleteParameter*",
    "ssm:PutParameter",
];

const GUARDED_KEY_ACTIONS: &[&str] = &[
    "kms:Encrypt",
    "kms:Decrypt",
    "kms:ScheduleKeyDeletion",
    "kms:DisableKey",
    "kms:DeleteAlias",
    "kms:GenerateDataKey*",
    "kms:CreateGrant",
];

const POLICY_VERSION: &str = "2012-10-17";

fn secret_resources(secret_path_arn: &str) -> Value {
    json!([secret_path_arn, format!("{secret_path_arn}/*")])
}

/// Inline policy that lets the vault identity use the secret path and key.
pub fn access_policy_document(secret_path_arn: &str, key_arn: &str) -> Value {
    json!({
        "Version": POLICY_VERSION,
        "Statement": [
            {
                "Effect": "Allow",
                "Action": SECRET_ACTIONS,
                "Resource": secret_resources(secret_path_arn),
            },
            {
                "Effect": "Allow",
                "Action": KEY_ACTIONS,
                "Resource": key_arn,
            }
        ]
    })
}

/// Organization policy denying the vault's resources to every other principal.
pub fn guardrail_policy_document(secret_path_arn: &str, key_arn: &str, identity_arn: &str) -> Value {
    let unless_vault_identity = json!({
        "StringNotLike": { "aws:PrincipalARN": identity_arn }
    });

    json!({
        "Version": POLICY_VERSION,
        "Statement": [
            {
                "Effect": "Deny",
                "Action": GUARDED_SECRET_ACTIONS,
                "Resource": secret_resources(secret_path_arn),
                "Condition": unless_vault_identity,
            },
            {
                "Effect": "Deny",
                "Action": GUARDED_KEY_ACTIONS,
                "Resource": key_arn,
                "Condition": unless_vault_identity,
            }
        ]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PATH_ARN: &str = "arn:aws:ssm:us-east-1:123456789012:parameter/vault";
    const KEY_ARN: &str = "arn:aws:kms:us-east-1:123456789012:key/k-1";
    const USER_ARN: &str = "arn:aws:iam::123456789012:user/vault-user";

    #[test]
    fn test_access_policy_covers_path_children_and_key() {
        let doc = access_policy_document(PATH_ARN, KEY_ARN);
        let statements = doc["Statement"].as_array().unwrap();
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[0]["Resource"][0], PATH_ARN);
        assert_eq!(statements[0]["Resource"][1], format!("{PATH_ARN}/*"));
        assert_eq!(statements[1]["Resource"], KEY_ARN);
        assert!(statements.iter().all(|s| s["Effect"] == "Allow"));
    }

    #[test]
    fn test_guardrail_exempts_only_vault_identity() {
        let doc = guardrail_policy_document(PATH_ARN, KEY_ARN, USER_ARN);
        for statement in doc["Statement"].as_array().unwrap() {
            assert_eq!(statement["Effect"], "Deny");
            assert_eq!(
                statement["Condition"]["StringNotLike"]["aws:PrincipalARN"],
                USER_ARN
            );
        }
        let key_actions = doc["Statement"][1]["Action"].as_array().unwrap();
        assert!(key_actions.iter().any(|a| a == "kms:ScheduleKeyDeletion"));
    }
}
