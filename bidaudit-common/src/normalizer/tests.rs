use super::*;

fn extraction() -> AliasTable {
    AliasTable::extraction()
}

fn value_of(raw: &str) -> Option<String> {
    normalize(raw, &extraction()).value
}

fn fenced(body: &str) -> String {
    format!("```json\n{}\n```", body)
}

#[test]
fn test_documented_examples() {
    assert_eq!(
        value_of("```json\n{\"value\":\"2024-01-01\"}\n```").as_deref(),
        Some("2024-01-01")
    );
    assert_eq!(value_of("\"未找到\""), None);
    assert_eq!(value_of("{\"项目名称\":\"测试项目\"}").as_deref(), Some("测试项目"));
}

#[test]
fn test_every_canonical_key_is_recognised() {
    let table = extraction();
    for key in &table.value_keys {
        let raw = format!(r#"{{"{}": "X-1", "other": "ignored", "page": 2}}"#, key);
        let result = normalize(&raw, &table);
        assert_eq!(result.value.as_deref(), Some("X-1"), "alias key {}", key);
        assert_eq!(result.status, NormalizedStatus::Found);
    }
}

#[test]
fn test_canonical_keys_are_case_insensitive() {
    assert_eq!(value_of(r#"{"VALUE": "abc", "note": "x"}"#).as_deref(), Some("abc"));
    assert_eq!(value_of(r#"{"Result": "abc", "note": "x"}"#).as_deref(), Some("abc"));
}

#[test]
fn test_fence_stripping_is_transparent() {
    let bodies = [
        r#"{"value":"2024-01-01"}"#,
        r#"{"招标人":"某某公司","page":3}"#,
        r#"{"a":"1","b":"2"}"#,
        r#""未提及""#,
        "plain answer",
        r#"预算金额 "value": "100万元""#,
        "123",
        "null",
    ];
    for body in bodies {
        assert_eq!(
            normalize(&fenced(body), &extraction()),
            normalize(body, &extraction()),
            "fenced vs bare: {}",
            body
        );
    }
}

#[test]
fn test_fence_variants() {
    assert_eq!(strip_code_fences("```\n{\"a\":1}\n```"), "{\"a\":1}");
    assert_eq!(strip_code_fences("```JSON\n{\"a\":1}\n```"), "{\"a\":1}");
    assert_eq!(strip_code_fences("```{\"a\":1}```"), "{\"a\":1}");
    assert_eq!(strip_code_fences("结果如下：\n```json\n{\"a\":1}\n```\n以上"), "{\"a\":1}");
    assert_eq!(strip_code_fences("```json\n{\"a\":1}"), "{\"a\":1}");
    assert_eq!(strip_code_fences("  no fences  "), "no fences");
}

#[test]
fn test_single_key_string_is_extracted() {
    let cases = [
        (r#"{"投标截止时间":"2024-05-06 09:30"}"#, "2024-05-06 09:30"),
        (r#"{"anything":"v"}"#, "v"),
        (r#"{"开标地点":"市公共资源交易中心","page":4,"snippet":"开标地点：市公共资源交易中心"}"#, "市公共资源交易中心"),
    ];
    for (raw, expected) in cases {
        assert_eq!(value_of(raw).as_deref(), Some(expected), "input {}", raw);
    }
}

#[test]
fn test_multiple_keys_serialize_whole_object() {
    let result = normalize(r#"{"a":"1","b":"2"}"#, &extraction());
    let value = result.value.unwrap();
    let parsed: Value = serde_json::from_str(&value).unwrap();
    assert_eq!(parsed["a"], "1");
    assert_eq!(parsed["b"], "2");
}

#[test]
fn test_nested_object_unwrapped_one_level() {
    assert_eq!(value_of(r#"{"data":{"value":"inner"}}"#).as_deref(), Some("inner"));
    assert_eq!(value_of(r#"{"result":{"only":"one"}}"#).as_deref(), Some("one"));

    // Two levels of nesting stop at serialization
    let value = value_of(r#"{"data":{"value":{"deep":"x"}}}"#).unwrap();
    assert_eq!(value, r#"{"deep":"x"}"#);

    // Several inner keys: inner object serialized
    let value = value_of(r#"{"data":{"a":"1","b":"2"}}"#).unwrap();
    let parsed: Value = serde_json::from_str(&value).unwrap();
    assert_eq!(parsed["b"], "2");
}

#[test]
fn test_scalar_json_values() {
    assert_eq!(value_of("42").as_deref(), Some("42"));
    assert_eq!(value_of("3.5").as_deref(), Some("3.5"));
    assert_eq!(value_of("true").as_deref(), Some("true"));
    assert_eq!(value_of(r#"{"value": 100000}"#).as_deref(), Some("100000"));
    assert_eq!(value_of(r#"{"value": ["A公司", "B公司"]}"#).as_deref(), Some("A公司、B公司"));
}

#[test]
fn test_null_and_empty_values_are_missing() {
    for raw in ["null", r#"{"value": null}"#, r#"{"value": ""}"#, r#"{"value": []}"#, "{}", "", "   "] {
        let result = normalize(raw, &extraction());
        assert_eq!(result.value, None, "input {:?}", raw);
        assert_eq!(result.status, NormalizedStatus::Missing, "input {:?}", raw);
    }
}

#[test]
fn test_not_found_phrases_never_leak() {
    let table = extraction();
    for phrase in table.not_found.clone() {
        for raw in [
            phrase.clone(),
            format!("\"{}\"", phrase),
            format!(r#"{{"value": "{}"}}"#, phrase),
            fenced(&format!(r#"{{"字段": "{}"}}"#, phrase)),
        ] {
            let result = normalize(&raw, &table);
            assert_eq!(result.value, None, "input {:?}", raw);
            assert!(result.is_missing());
        }
    }
}

#[test]
fn test_not_found_ignores_ascii_case_and_trailing_punctuation() {
    assert_eq!(value_of("N/A"), None);
    assert_eq!(value_of("NULL"), None);
    assert_eq!(value_of("未找到。"), None);
    assert_eq!(value_of("Not Found."), None);
    // A phrase embedded in a longer answer is a real value
    assert_eq!(value_of("未找到原件，见复印件").as_deref(), Some("未找到原件，见复印件"));
}

#[test]
fn test_regex_fallback_for_broken_json() {
    // Trailing comma makes this invalid JSON
    assert_eq!(value_of(r#"{"value": "50万元", }"#).as_deref(), Some("50万元"));
    // Prose with an embedded pair, value key preferred over others
    assert_eq!(
        value_of(r#"根据文件 "page": "3", "result": "张三" 可知"#).as_deref(),
        Some("张三")
    );
    // No value key: first non-metadata pair
    assert_eq!(value_of(r#"答：'招标人'..."招标人"："某局""#).as_deref(), Some("某局"));
}

#[test]
fn test_json_embedded_in_prose() {
    assert_eq!(
        value_of(r#"好的，提取结果为 {"value": "2024年6月"} 请核对"#).as_deref(),
        Some("2024年6月")
    );
}

#[test]
fn test_plain_text_falls_through() {
    assert_eq!(value_of("  某某建设集团有限公司 \n").as_deref(), Some("某某建设集团有限公司"));
}

#[test]
fn test_surrounding_quotes_stripped() {
    let cases = [
        ("'abc'", "abc"),
        ("“中文引号”", "中文引号"),
        ("「项目」", "项目"),
        (r#""'nested'""#, "nested"),
        (r#"{"value": "\"quoted\""}"#, "quoted"),
    ];
    for (raw, expected) in cases {
        assert_eq!(value_of(raw).as_deref(), Some(expected), "input {}", raw);
    }
    assert_eq!(strip_quotes("\""), "\"");
    assert_eq!(strip_quotes("\"\""), "");
    assert_eq!(strip_quotes("a\"b"), "a\"b");
}

#[test]
fn test_evidence_extraction() {
    let result = normalize(
        r#"{"value":"100万元","page":"第12页","snippet":"预算金额：100万元","bbox":[10, 20.5, 300, 40]}"#,
        &extraction(),
    );
    let evidence = result.evidence.unwrap();
    assert_eq!(evidence.page, Some(12));
    assert_eq!(evidence.snippet.as_deref(), Some("预算金额：100万元"));
    assert_eq!(evidence.bbox, Some(vec![10.0, 20.5, 300.0, 40.0]));

    let nested = normalize(
        r#"{"value":"x","evidence":{"page":5,"snippet":"..x.."}}"#,
        &extraction(),
    );
    assert_eq!(nested.evidence.unwrap().page, Some(5));

    let inner = normalize(r#"{"data":{"value":"x","页码":7}}"#, &extraction());
    assert_eq!(inner.evidence.unwrap().page, Some(7));
}

#[test]
fn test_evidence_kept_when_value_missing() {
    let result = normalize(r#"{"value":"未找到","page":2}"#, &extraction());
    assert!(result.is_missing());
    assert_eq!(result.evidence.unwrap().page, Some(2));
}

#[test]
fn test_metadata_only_object_is_missing() {
    let result = normalize(r#"{"page": 3, "snippet": "..."}"#, &extraction());
    assert!(result.is_missing());
}

#[test]
fn test_dynamic_value_key_outranked_by_canonical() {
    let table = extraction().with_value_key("项目编号");
    let raw = r#"{"项目编号":"ZB-001","备注":"x"}"#;
    assert_eq!(normalize(raw, &table).value.as_deref(), Some("ZB-001"));

    let raw = r#"{"value":"canonical","项目编号":"ZB-001"}"#;
    assert_eq!(normalize(raw, &table).value.as_deref(), Some("canonical"));
}

#[test]
fn test_classification_table_prefers_doc_type_key() {
    let raw = r#"{"docType":"营业执照","value":"other"}"#;
    let result = normalize(raw, &AliasTable::classification());
    assert_eq!(result.value.as_deref(), Some("营业执照"));
}

#[test]
fn test_never_panics_on_odd_input() {
    let inputs = [
        "```",
        "``````",
        "```\n",
        "{",
        "}{",
        "\"",
        "'",
        "“",
        "{\"value\": \"\\u00e9\"}",
        "\u{feff}{\"value\":\"bom\"}",
        "[1, {\"a\": 2}]",
        "{\"value\": {\"a\": {\"b\": {\"c\": 1}}}}",
    ];
    for raw in inputs {
        let _ = normalize(raw, &extraction());
        let _ = normalize(raw, &AliasTable::audit());
    }
}

#[test]
fn test_parse_object_tolerates_fences_and_prose() {
    let map = parse_object("```json\n{\"conclusion\":\"fail\",\"severity\":\"high\"}\n```").unwrap();
    assert_eq!(map["severity"], "high");

    let map = parse_object("审核完成：{\"结论\":\"通过\"} 以上").unwrap();
    assert_eq!(map["结论"], "通过");

    assert!(parse_object("[1, 2]").is_none());
    assert!(parse_object("plain text").is_none());
}
