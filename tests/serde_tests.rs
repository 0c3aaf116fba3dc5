#[cfg(feature = "serde")]
mod serde_tests {
    use talc::{CompileOptions, Dialect, SyntaxError, SyntaxErrorKind, TalcError};

    #[test]
    fn test_dialect_serialization() {
        let dialect = Dialect::Path;
        let serialized = serde_json::to_string(&dialect).unwrap();
        assert_eq!(serialized, r#""Path""#);

        let deserialized: Dialect = serde_json::from_str(&serialized).unwrap();
        assert_eq!(deserialized, dialect);
    }

    #[test]
    fn test_options_round_trip() {
        let options = CompileOptions {
            dialects: vec![Dialect::Path, Dialect::Generic],
            memo_capacity: 64,
            interpolate: false,
        };
        let serialized = serde_json::to_string(&options).unwrap();
        let deserialized: CompileOptions = serde_json::from_str(&serialized).unwrap();
        assert_eq!(deserialized, options);
    }

    #[test]
    fn test_error_round_trip_preserves_kind() {
        let error = TalcError::Syntax(SyntaxError::new(
            "a ** b",
            SyntaxErrorKind::DisallowedToken {
                lexeme: "*".to_string(),
            },
        ));
        let serialized = serde_json::to_string(&error).unwrap();
        let deserialized: TalcError = serde_json::from_str(&serialized).unwrap();
        assert_eq!(deserialized, error);
        assert!(deserialized.to_string().contains("a ** b"));
    }

    #[test]
    fn test_compile_error_is_serializable() {
        let err = talc::Compiler::new()
            .compile("<p condition=\"a ** b\">x</p>")
            .unwrap_err();
        let serialized = serde_json::to_string(&err).unwrap();
        let deserialized: TalcError = serde_json::from_str(&serialized).unwrap();
        assert_eq!(deserialized, err);
    }
}
