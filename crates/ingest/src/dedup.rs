const KEY_SEPARATOR: char = ':';

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

/// `{message_id}:{request_id}`; records missing either id cannot be deduplicated.
pub fn message_identity(message_id: Option<&str>, request_id: Option<&str>) -> Option<String> {
    let message_id = non_empty(message_id)?;
    let request_id = non_empty(request_id)?;
    Some(format!("{message_id}{KEY_SEPARATOR}{request_id}"))
}

pub fn limit_identity(leaf_id: Option<&str>) -> Option<String> {
    non_empty(leaf_id).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_identity_requires_both_ids() {
        assert_eq!(
            message_identity(Some("msg_1"), Some("req_1")).as_deref(),
            Some("msg_1:req_1")
        );
        assert_eq!(message_identity(Some("msg_1"), None), None);
        assert_eq!(message_identity(None, Some("req_1")), None);
        assert_eq!(message_identity(Some(" "), Some("req_1")), None);
    }

    #[test]
    fn limit_identity_is_leaf_id() {
        assert_eq!(limit_identity(Some("leaf")).as_deref(), Some("leaf"));
        assert_eq!(limit_identity(Some("")), None);
        assert_eq!(limit_identity(None), None);
    }
}
