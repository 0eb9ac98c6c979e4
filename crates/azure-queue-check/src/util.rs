// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Parses and validates the configured metric namespace.
///
/// A valid namespace starts with an ASCII letter and contains only ASCII alphanumerics,
/// underscores or periods. Surrounding whitespace is trimmed.
///
/// ```
/// use azure_queue_check::util::parse_metric_namespace;
///
/// assert_eq!(parse_metric_namespace("custom.azure_queue"), Some("custom.azure_queue".to_string()));
/// assert_eq!(parse_metric_namespace("1queue"), None);
/// assert_eq!(parse_metric_namespace("azure-queue"), None);
/// ```
pub fn parse_metric_namespace(namespace: &str) -> Option<String> {
    let trimmed = namespace.trim();
    let mut chars = trimmed.chars();

    match chars.next() {
        Some(first_char) if first_char.is_ascii_alphabetic() => {}
        Some(_) => {
            tracing::error!(
                "Metric namespace must start with a letter, got: '{}'. Ignoring namespace.",
                trimmed
            );
            return None;
        }
        None => return None,
    }

    if let Some(invalid_char) =
        chars.find(|&ch| !ch.is_ascii_alphanumeric() && ch != '_' && ch != '.')
    {
        tracing::error!(
            "Metric namespace contains invalid character '{}' in '{}'. Ignoring namespace.",
            invalid_char,
            trimmed
        );
        return None;
    }

    // A trailing period would produce names like `ns..depth`
    Some(trimmed.trim_end_matches('.').to_string())
}
