use objgate::{CompilerConfig, FindOptions, MatchMode, ObjectService, QueryCompiler, ServiceConfig};
use serde_json::json;

#[test]
fn compiled_filters_are_stable_across_compilers() {
    let a = QueryCompiler::default();
    let b = QueryCompiler::new(CompilerConfig::default()).unwrap();

    for search in [
        "",
        "status:A",
        "weight>=50 weight<=90 weight!:70",
        "b:1 a:2 c>3",
        "  double  spaces ",
    ] {
        assert_eq!(
            a.compile_to_string(Some(search)),
            b.compile_to_string(Some(search)),
            "{search:?}"
        );
    }
}

#[test]
fn field_order_follows_first_appearance() {
    let compiler = QueryCompiler::default();
    assert_eq!(
        compiler.compile_to_string(Some("z:1 a>2 m:x a<9")),
        r#"{"z":1,"a":{"$gt":2,"$lt":9},"m":"x"}"#
    );
}

#[test]
fn match_modes_only_differ_on_partial_matches() {
    let unanchored = QueryCompiler::default();
    let anchored =
        QueryCompiler::new(CompilerConfig::default().with_matching(MatchMode::Anchored)).unwrap();

    let clean = "status:A weight>=50 active:true price:19.99";
    assert_eq!(
        unanchored.compile_to_string(Some(clean)),
        anchored.compile_to_string(Some(clean))
    );

    let partial = "code:v2 flag:untrue";
    assert_ne!(
        unanchored.compile_to_string(Some(partial)),
        anchored.compile_to_string(Some(partial))
    );
}

#[test]
fn repeated_searches_return_identical_results() {
    let service = ObjectService::new(&ServiceConfig::default()).unwrap();
    for i in 0..20 {
        service
            .insert("db", "c", Some(&format!("id-{i:02}")), json!({"n": i % 7}))
            .unwrap();
    }

    let first = service
        .search("db", "c", Some("n>=3"), &FindOptions::default())
        .unwrap();
    for _ in 0..5 {
        let again = service
            .search("db", "c", Some("n>=3"), &FindOptions::default())
            .unwrap();
        assert_eq!(first, again);
    }
}
