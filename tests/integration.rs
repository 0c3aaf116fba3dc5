
use fixtures::{assert_ordered, compiler, compiler_with};
use talc::{Dialect, TalcError};

#[test]
#[ntest::timeout(100)]
fn test_content_falls_back_to_static_markup() {
    let code = compiler()
        .compile("<span content=\"item.name | default\">Unknown</span>")
        .unwrap();
    assert_ordered(
        &code,
        &[
            "$tal_tmp0 = tal_mem($item)->name;",
            "if ($tal_tmp0 !== null && $tal_tmp0 !== '') {",
            "echo tal_esc($tal_tmp0);",
            "} else {",
            "echo 'Unknown';",
        ],
    );
}

#[test]
#[ntest::timeout(100)]
fn test_repeat_counting_loop_has_one_based_index() {
    let code = compiler()
        .compile("<li repeat=\"row list\">x</li>")
        .unwrap();
    assert_ordered(
        &code,
        &[
            "$item_row_seq = tal_seq($list);",
            "$item_row_cnt = count($item_row_seq);",
            "foreach ($item_row_seq as $item_row_key => $row) {",
            "$item_row_idx = $item_row_key + 1;",
            "echo '<li>x</li>';",
            "}",
        ],
    );
}

#[test]
#[ntest::timeout(100)]
fn test_repeat_magic_counters_resolve_inside_loop() {
    let code = compiler()
        .compile("<li repeat=\"row list\" content=\"repeat/row/index\">x</li>")
        .unwrap();
    assert_ordered(&code, &["foreach (", "echo tal_esc($item_row_idx);"]);
}

#[test]
#[ntest::timeout(100)]
fn test_replace_structure_emits_raw_output() {
    let code = compiler()
        .compile("<div replace=\"structure markup\">inner</div>")
        .unwrap();
    assert_eq!(code, "echo $markup;\n");
}

#[test]
#[ntest::timeout(100)]
fn test_replace_with_empty_expression_strips_tag() {
    let code = compiler()
        .compile("<b>keep</b><div replace=\"\">gone</div>")
        .unwrap();
    assert_eq!(code, "echo '<b>keep</b>';\n");
}

#[test]
#[ntest::timeout(100)]
fn test_attributes_nothing_can_drop_attribute() {
    let code = compiler()
        .compile("<a attributes=\"href nothing: url\">x</a>")
        .unwrap();
    assert_ordered(
        &code,
        &[
            "$tal_tmp0 = $url;",
            "if ($tal_tmp0 !== null && $tal_tmp0 !== '') {",
            "echo ' href=\"' . tal_esc($tal_tmp0) . '\"';",
            "}",
        ],
    );
    // The attribute never appears as a literal.
    assert!(!code.contains("href=\"\""));
}

#[test]
#[ntest::timeout(100)]
fn test_attributes_default_falls_back_to_literal_value() {
    let code = compiler()
        .compile("<a href=\"/home\" attributes=\"href default: user/link\">x</a>")
        .unwrap();
    assert_ordered(
        &code,
        &[
            "$tal_tmp0 = $user['link'];",
            "echo ' href=\"' . tal_esc($tal_tmp0) . '\"';",
            "} else {",
            "echo ' href=\"/home\"';",
        ],
    );
}

#[test]
#[ntest::timeout(100)]
fn test_default_output_is_escaped_structure_is_not() {
    let escaped = compiler().compile("<p content=\"msg\">x</p>").unwrap();
    assert!(escaped.contains("echo tal_esc($msg);"));

    let raw = compiler()
        .compile("<p content=\"structure msg\">x</p>")
        .unwrap();
    assert!(raw.contains("echo $msg;"));
    assert!(!raw.contains("tal_esc"));
}

#[test]
#[ntest::timeout(100)]
fn test_alternation_short_circuits_to_first_truthy() {
    let code = compiler()
        .compile("<p content=\"item/name | item/alias | 'anonymous'\">x</p>")
        .unwrap();
    assert!(code.contains("($item['name'] ?: $item['alias'] ?: 'anonymous')"));
}

#[test]
#[ntest::timeout(100)]
fn ladder_stops_at_plain_sibling() {
    let code = compiler()
        .compile(
            "<div if=\"a\">A</div><div elseif=\"b\">B</div><div elseif=\"c\">C</div><span>plain</span><div elseif=\"d\">D</div>",
        )
        .unwrap();
    assert_ordered(
        &code,
        &[
            "if ($a) {",
            "else if ($b) {",
            "else if ($c) {",
            "echo '<span>plain</span>",
        ],
    );
    assert_eq!(code.matches("else if (").count(), 2);
    // The trailing `elseif` was never stitched into the ladder: its
    // attribute is still literal in the output.
    assert!(code.contains("<div elseif=\"d\">D</div>"));
}

#[test]
#[ntest::timeout(100)]
fn test_ladder_else_terminates_chain() {
    let code = compiler()
        .compile("<div if=\"a\">A</div><div elseif=\"b\">B</div><div else=\"\">C</div>")
        .unwrap();
    assert_ordered(
        &code,
        &["if ($a) {", "else if ($b) {", "else {", "echo '<div"],
    );
}

#[test]
#[ntest::timeout(100)]
fn test_reactive_attributes_are_retained_for_the_client() {
    let code = compiler().compile("<div if=\"cond\">x</div>").unwrap();
    // Server-side ladder plus the original attribute for the client half.
    assert!(code.contains("if ($cond) {"));
    assert!(code.contains("<div if=\"cond\">"));
}

#[test]
#[ntest::timeout(100)]
fn test_once_disables_client_duplication() {
    let code = compiler().compile("<div once if=\"cond\">x</div>").unwrap();
    assert!(code.contains("if ($cond) {"));
    assert!(!code.contains("if=\"cond\""));
}

#[test]
#[ntest::timeout(100)]
fn test_reactive_for_loop() {
    let code = compiler()
        .compile("<li for=\"item in items\">x</li>")
        .unwrap();
    assert_ordered(
        &code,
        &[
            "$item_item_seq = tal_seq($items);",
            "foreach ($item_item_seq as $item_item_key => $item) {",
        ],
    );
    assert!(code.contains("for=\"item in items\""));
}

#[test]
#[ntest::timeout(100)]
fn test_bind_and_shorthand_compile_to_computed_attributes() {
    let code = compiler().compile("<a bind:href=\"url\">x</a>").unwrap();
    assert!(code.contains("echo ' href=\"' . tal_esc($url) . '\"';"));
    assert!(code.contains("bind:href=\"url\""));

    let code = compiler().compile("<a :title=\"tip\">x</a>").unwrap();
    assert!(code.contains("echo ' title=\"' . tal_esc($tip) . '\"';"));
}

#[test]
#[ntest::timeout(100)]
fn test_show_toggles_inline_style() {
    let code = compiler().compile("<div show=\"visible\">x</div>").unwrap();
    assert_ordered(
        &code,
        &["if (!($visible)) {", "echo ' style=\"display:none\"';"],
    );
    assert!(code.contains("show=\"visible\""));
}

#[test]
#[ntest::timeout(100)]
fn test_text_and_html_bindings() {
    let code = compiler().compile("<p text=\"msg\">old</p>").unwrap();
    assert!(code.contains("echo tal_esc($msg);"));
    assert!(!code.contains("old"));

    let code = compiler().compile("<p html=\"body\">old</p>").unwrap();
    assert!(code.contains("echo $body;"));
}

#[test]
#[ntest::timeout(100)]
fn test_function_call_in_content() {
    let code = compiler()
        .compile("<p content=\"format(item/price, 'en-GB')\">x</p>")
        .unwrap();
    assert!(code.contains("echo tal_esc(format($item['price'], 'en-GB'));"));
}

#[test]
#[ntest::timeout(100)]
fn test_polymorphic_plus_for_unknown_operands() {
    let code = compiler().compile("<p content=\"a.b + 1\">x</p>").unwrap();
    assert!(code.contains("tal_plus(tal_mem($a)->b, 1)"));
}

#[test]
#[ntest::timeout(100)]
fn test_generic_dialect_var_while_foreach() {
    let mut compiler = compiler_with(&[Dialect::Generic]);
    let code = compiler.compile("<p var=\"x count + 1\">t</p>").unwrap();
    assert!(code.contains("$x = tal_plus($count, 1);"));

    let code = compiler
        .compile("<li foreach=\"item items\">x</li>")
        .unwrap();
    assert!(code.contains("foreach (tal_seq($items) as $item) {"));

    let code = compiler.compile("<p while=\"busy\">spin</p>").unwrap();
    assert_ordered(&code, &["while ($busy) {", "echo '<p>spin</p>';", "}"]);
}

#[test]
#[ntest::timeout(100)]
fn test_generic_for_numeric_range_and_raw_clause() {
    let mut compiler = compiler_with(&[Dialect::Generic]);
    let code = compiler.compile("<p for=\"i 1 10\">t</p>").unwrap();
    assert!(code.contains("for ($i = 1; $i <= 10; $i++) {"));

    let code = compiler
        .compile("<p for=\"$i = 0; $i < $n; $i++\">t</p>")
        .unwrap();
    assert!(code.contains("for ($i = 0; $i < $n; $i++) {"));
}

#[test]
#[ntest::timeout(100)]
fn test_generic_tag_if_guards_tag_literals() {
    let mut compiler = compiler_with(&[Dialect::Generic]);
    let code = compiler.compile("<b tag-if=\"flag\">x</b>").unwrap();
    assert_ordered(
        &code,
        &["= (!($flag));", "echo '<b>';", "echo 'x';", "echo '</b>';"],
    );
}

#[test]
#[ntest::timeout(100)]
fn test_define_then_condition_then_repeat_nesting() {
    let code = compiler()
        .compile("<li define=\"n items\" condition=\"n\" repeat=\"item n\">${item/label}</li>")
        .unwrap();
    assert_ordered(
        &code,
        &[
            "$n = $items;",
            "if ($n) {",
            "foreach (",
            "echo tal_esc($item['label']);",
        ],
    );
}

#[test]
#[ntest::timeout(100)]
fn test_directive_error_reports_name_and_tag() {
    let err = compiler().compile("<p define=\"oops\">x</p>").unwrap_err();
    let TalcError::Directive(inner) = err else {
        panic!("expected a directive error, got {:?}", err);
    };
    assert_eq!(inner.directive, "define");
    assert_eq!(inner.tag, "p");
}

#[test]
#[ntest::timeout(100)]
fn test_multi_statement_expression_is_fatal() {
    let err = compiler()
        .compile("<p condition=\"a; b\">x</p>")
        .unwrap_err();
    assert!(matches!(err, TalcError::Directive(_)));
}

#[test]
#[ntest::timeout(100)]
fn test_markup_error_reports_position() {
    let err = compiler().compile("<div>\n  <p>oops</div>").unwrap_err();
    let TalcError::Markup(inner) = err else {
        panic!("expected a markup error, got {:?}", err);
    };
    assert_eq!(inner.line, 2);
}

#[test]
#[ntest::timeout(100)]
fn test_content_on_repeat_node_renders_each_item() {
    let code = compiler()
        .compile("<li repeat=\"row rows\" content=\"row/name\">x</li>")
        .unwrap();
    assert_ordered(
        &code,
        &[
            "foreach ($item_row_seq as $item_row_key => $row) {",
            "echo '<li>';",
            "echo tal_esc($row['name']);",
            "echo '</li>';",
            "}",
        ],
    );
}

#[test]
#[ntest::timeout(100)]
fn test_nested_elements_compile_depth_first() {
    let code = compiler()
        .compile("<ul condition=\"items\"><li repeat=\"item items\">$item</li></ul>")
        .unwrap();
    assert_ordered(
        &code,
        &[
            "if ($items) {",
            "echo '<ul>';",
            "foreach (",
            "echo '<li>';",
            "echo tal_esc($item);",
            "echo '</li>';",
            "}",
            "echo '</ul>';",
            "}",
        ],
    );
}
