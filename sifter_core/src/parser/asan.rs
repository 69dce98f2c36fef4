use super::LogParseError;
use crate::description::{BugInfo, describe};
use crate::linestream::LineStream;
use crate::stacktrace::next_stack_trace;
use crate::vulnerability::{Category, Vulnerability};
use tracing::debug;

const GENERIC_ERROR_TYPES: &[(&str, Category)] = &[
    ("unknown-crash", Category::MemoryError),
    ("heap-buffer-overflow", Category::MemoryError),
    ("heap-use-after-free", Category::MemoryError),
    ("stack-buffer-underflow", Category::MemoryError),
    ("initialization-order-fiasco", Category::LogicError),
    ("stack-buffer-overflow", Category::MemoryError),
    ("stack-use-after-return", Category::MemoryError),
    ("use-after-poison", Category::MemoryError),
    ("container-overflow", Category::MemoryError),
    ("stack-use-after-scope", Category::MemoryError),
    ("global-buffer-overflow", Category::MemoryError),
    ("intra-object-overflow", Category::MemoryError),
    ("dynamic-stack-buffer-overflow", Category::MemoryError),
    ("alloc-dealloc-mismatch", Category::LogicError),
    ("new-delete-type-mismatch", Category::LogicError),
    ("negative-size-param", Category::MemoryError),
    ("invalid-pointer-pair", Category::MemoryError),
];

/// Headers of the form `attempting <...>`, matched on the text after
/// `attempting`.
const ATTEMPTING_ERRORS: &[(&str, Category, &str)] = &[
    ("free", Category::MemoryError, "free-not-malloced"),
    ("double", Category::MemoryError, "double-free"),
    ("to call malloc", Category::LogicError, "malloc_usable_size"),
    ("to call __s", Category::LogicError, "__sanitizer_get_allocated_size"),
];

const PARAM_OVERLAP_SUFFIX: &str = "param-overlap";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsanHeader {
    pub category: Category,
    pub bug_type: String,
    /// Everything after `AddressSanitizer: `.
    pub description: String,
}

/// Classifies an AddressSanitizer header line.
pub fn parse_header(header: &str) -> Result<AsanHeader, LogParseError> {
    let fields: Vec<&str> = header.trim_end().split(": ").collect();
    if fields.len() < 3 {
        return Err(LogParseError::MalformedHeader(header.to_string()));
    }
    let description = fields[2..].join(": ");
    let potential_type = fields[2].split_whitespace().next().unwrap_or_default();

    if let Some((_, category)) = GENERIC_ERROR_TYPES
        .iter()
        .find(|(name, _)| *name == potential_type)
    {
        return Ok(AsanHeader {
            category: *category,
            bug_type: potential_type.to_string(),
            description,
        });
    }

    if description.starts_with("attempting") {
        let attempting_to = description
            .split_whitespace()
            .skip(1)
            .collect::<Vec<_>>()
            .join(" ");
        if let Some((_, category, bug_type)) = ATTEMPTING_ERRORS
            .iter()
            .find(|(prefix, _, _)| attempting_to.starts_with(*prefix))
        {
            return Ok(AsanHeader {
                category: *category,
                bug_type: bug_type.to_string(),
                description,
            });
        }
    }

    if potential_type.ends_with(PARAM_OVERLAP_SUFFIX) {
        return Ok(AsanHeader {
            category: Category::MemoryError,
            bug_type: potential_type.to_string(),
            description,
        });
    }

    Err(LogParseError::UnknownAsanHeader(description))
}

/// Produces the single vulnerability of an AddressSanitizer report.
pub fn vulnerabilities(
    header: &str,
    stream: &mut LineStream<'_>,
) -> Result<Vec<Vulnerability>, LogParseError> {
    let parsed = parse_header(header)?;
    debug!(bug_type = %parsed.bug_type, "parsing AddressSanitizer report");

    let info = BugInfo {
        bug_type: parsed.bug_type,
        header_info: parsed.description,
        trace: next_stack_trace(stream)?,
    };
    let description = describe(&info, stream)?;

    Ok(vec![Vulnerability::new(
        parsed.category,
        info.bug_type,
        description,
        info.trace.location,
        info.trace.path,
    )])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::Location;

    #[test]
    fn classifies_generic_types() {
        let header = parse_header(
            "==21045==ERROR: AddressSanitizer: heap-buffer-overflow on address 0x602000000033 at pc 0x51b0f8",
        )
        .unwrap();
        assert_eq!(header.category, Category::MemoryError);
        assert_eq!(header.bug_type, "heap-buffer-overflow");
        assert!(header.description.starts_with("heap-buffer-overflow on address"));

        let header =
            parse_header("==1==ERROR: AddressSanitizer: initialization-order-fiasco on 0x1")
                .unwrap();
        assert_eq!(header.category, Category::LogicError);
    }

    #[test]
    fn classifies_attempting_headers() {
        let cases = [
            (
                "attempting double-free on 0x602000000010 in thread T0:",
                "double-free",
                Category::MemoryError,
            ),
            (
                "attempting free on address which was not malloc()-ed: 0x7ffd in thread T0",
                "free-not-malloced",
                Category::MemoryError,
            ),
            (
                "attempting to call malloc_usable_size() for pointer which is not owned: 0x1",
                "malloc_usable_size",
                Category::LogicError,
            ),
            (
                "attempting to call __sanitizer_get_allocated_size() for pointer which is not owned: 0x1",
                "__sanitizer_get_allocated_size",
                Category::LogicError,
            ),
        ];
        for (text, bug_type, category) in cases {
            let header = parse_header(&format!("==7==ERROR: AddressSanitizer: {text}")).unwrap();
            assert_eq!(header.bug_type, bug_type, "header: {text}");
            assert_eq!(header.category, category, "header: {text}");
        }
    }

    #[test]
    fn classifies_param_overlap() {
        let header = parse_header(
            "==3==ERROR: AddressSanitizer: memcpy-param-overlap: memory ranges [0x1,0x4) and [0x2, 0x5) overlap",
        )
        .unwrap();
        assert_eq!(header.bug_type, "memcpy-param-overlap");
        assert_eq!(header.category, Category::MemoryError);
        assert!(header.description.contains("memory ranges"));
    }

    #[test]
    fn rejects_unknown_headers() {
        assert!(matches!(
            parse_header("==3==ERROR: AddressSanitizer: SEGV on unknown address 0x000000000000"),
            Err(LogParseError::UnknownAsanHeader(_))
        ));
        assert!(matches!(
            parse_header("==3==ERROR: AddressSanitizer"),
            Err(LogParseError::MalformedHeader(_))
        ));
    }

    #[test]
    fn builds_one_vulnerability_per_report() {
        let header = "==21045==ERROR: AddressSanitizer: stack-use-after-scope on address 0x7ffe";
        let body = "\
WRITE of size 4 at 0x7ffe thread T0
    #0 0x51b0f7 in scoped /src/scope.c:8:12
    #1 0x51b1a4 in LLVMFuzzerTestOneInput /src/fuzz_target.cc:10:3

MS: 1 ChangeBit-; base unit: 00
0x31,
1
";
        let mut stream = LineStream::new(body.as_bytes());
        let found = vulnerabilities(header, &mut stream).unwrap();

        assert_eq!(found.len(), 1);
        let vulnerability = &found[0];
        assert_eq!(vulnerability.bug_type, "stack-use-after-scope");
        assert_eq!(vulnerability.location, Location::new("/src/scope.c", 8, 12));
        assert_eq!(vulnerability.path.len(), 2);
        assert!(vulnerability.description.ends_with("Hex: 0x31,\nASCII: 1\n"));
        assert!(vulnerability.issue_hash.is_empty());
    }
}
