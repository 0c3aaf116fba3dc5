//! The fixed runtime support library referenced by compiled templates.
//!
//! The compiler emits plain PHP statements that call four helpers:
//!
//! - `tal_mem($value)` — adapter wrap: uniform `->member` access over
//!   arrays, objects and scalar-like values.
//! - `tal_plus(…$operands)` — polymorphic add: concatenates when the first
//!   operand is a string at runtime, adds otherwise.
//! - `tal_esc($value)` — HTML-safe escape; every non-`structure` output
//!   statement routes through it.
//! - `tal_seq($value)` — iterable normalization for the counting loops.
//!
//! The executor prepends [`SUPPORT_LIB`] (or its own drop-in equivalents)
//! to the compiled blob before running it against a data context.

pub const SUPPORT_LIB: &str = r#"<?php

final class TalAdapter
{
    private $value;

    public function __construct($value)
    {
        $this->value = $value;
    }

    public function __get($name)
    {
        if (is_array($this->value) && array_key_exists($name, $this->value)) {
            return new self($this->value[$name]);
        }
        if (is_object($this->value) && isset($this->value->$name)) {
            return new self($this->value->$name);
        }
        return new self(null);
    }

    public function __toString()
    {
        $value = $this->unwrap();
        return $value === null ? '' : (string) $value;
    }

    public function unwrap()
    {
        return $this->value instanceof self ? $this->value->unwrap() : $this->value;
    }
}

function tal_mem($value)
{
    return $value instanceof TalAdapter ? $value : new TalAdapter($value);
}

function tal_plus(...$operands)
{
    $first = $operands[0] ?? null;
    if ($first instanceof TalAdapter) {
        $first = $first->unwrap();
    }
    if (is_string($first) && !is_numeric($first)) {
        $out = '';
        foreach ($operands as $operand) {
            $out .= (string) $operand;
        }
        return $out;
    }
    $out = 0;
    foreach ($operands as $operand) {
        if ($operand instanceof TalAdapter) {
            $operand = $operand->unwrap();
        }
        $out += $operand === null ? 0 : +$operand;
    }
    return $out;
}

function tal_esc($value)
{
    if ($value instanceof TalAdapter) {
        $value = $value->unwrap();
    }
    return htmlspecialchars((string) $value, ENT_QUOTES, 'UTF-8');
}

function tal_seq($value)
{
    if ($value instanceof TalAdapter) {
        $value = $value->unwrap();
    }
    if ($value === null) {
        return array();
    }
    if (is_array($value)) {
        return array_values($value);
    }
    if ($value instanceof Traversable) {
        return array_values(iterator_to_array($value));
    }
    return array($value);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[ntest::timeout(100)]
    fn test_support_lib_defines_all_helpers() {
        for helper in ["tal_mem", "tal_plus", "tal_esc", "tal_seq"] {
            assert!(
                SUPPORT_LIB.contains(&format!("function {}(", helper)),
                "missing {}",
                helper
            );
        }
    }
}
