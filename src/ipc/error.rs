use serde_json::json;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_envelope_omits_absent_details() {
        let v = err("7", "not_found", "student not found: s1", None);
        assert_eq!(v["ok"], false);
        assert_eq!(v["error"]["code"], "not_found");
        assert!(v["error"].get("details").is_none());
        let v = err("7", "not_found", "x", Some(json!({ "entity": "student" })));
        assert_eq!(v["error"]["details"]["entity"], "student");
    }
}
