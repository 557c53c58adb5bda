use regex::{Captures, Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;
use tracing::{debug, warn};

/// Capture groups whose name starts with this prefix guard a match: when one
/// of them participates, the matched text is left as it was.
const GUARD_PREFIX: &str = "keep";

const PARAMETER_TYPES: &str = "NVARCHAR|VARCHAR|NCHAR|CHAR|BIGINT|SMALLINT|TINYINT|INT|BIT|\
DATETIME2|DATETIME|DATE|DECIMAL|NUMERIC|FLOAT|MONEY";

/// A text-match → replacement-template pair in the pattern table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleDefinition {
    pub rule_id: String,
    pub group: RuleGroup,
    pub pattern: String,
    /// Template using `${name}` / `${1}` capture references
    pub replacement: String,
}

/// Rule groups of the standard table, in the order they must run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleGroup {
    Boilerplate,
    Parameters,
    Functions,
    TableReferences,
    TempTables,
    LocalVariables,
    Custom,
}

/// Record of a rule that changed the text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedRule {
    pub rule_id: String,
    pub replacements: usize,
}

/// A definition that could not be compiled and was left out of the table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedRule {
    pub rule_id: String,
    pub reason: String,
}

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("Invalid pattern for rule {rule_id}: {source}")]
    InvalidPattern {
        rule_id: String,
        #[source]
        source: regex::Error,
    },
}

impl RuleDefinition {
    pub fn new(
        rule_id: impl Into<String>,
        group: RuleGroup,
        pattern: impl Into<String>,
        replacement: impl Into<String>,
    ) -> Self {
        Self {
            rule_id: rule_id.into(),
            group,
            pattern: pattern.into(),
            replacement: replacement.into(),
        }
    }
}

#[derive(Debug, Clone)]
struct CompiledRule {
    definition: RuleDefinition,
    regex: Regex,
    guard_groups: Vec<usize>,
}

impl CompiledRule {
    fn compile(definition: RuleDefinition) -> Result<Self, RuleError> {
        let regex = RegexBuilder::new(&definition.pattern)
            .case_insensitive(true)
            .dot_matches_new_line(true)
            .build()
            .map_err(|source| RuleError::InvalidPattern {
                rule_id: definition.rule_id.clone(),
                source,
            })?;

        let guard_groups = regex
            .capture_names()
            .enumerate()
            .filter_map(|(index, name)| {
                name.filter(|n| n.starts_with(GUARD_PREFIX)).map(|_| index)
            })
            .collect();

        Ok(Self {
            definition,
            regex,
            guard_groups,
        })
    }

    fn is_guarded(&self, caps: &Captures<'_>) -> bool {
        self.guard_groups.iter().any(|&index| caps.get(index).is_some())
    }

    /// Replace every unguarded match, returning the new text and the replacement count
    fn replace_all(&self, text: &str) -> (String, usize) {
        let mut replacements = 0;
        let output = self.regex.replace_all(text, |caps: &Captures<'_>| {
            if self.is_guarded(caps) {
                return caps[0].to_string();
            }
            replacements += 1;
            let mut expanded = String::new();
            caps.expand(&self.definition.replacement, &mut expanded);
            expanded
        });
        (output.into_owned(), replacements)
    }
}

/// Immutable ordered pattern table. Rule *i* runs on the output of rule *i - 1*.
#[derive(Debug, Clone)]
pub struct RuleTable {
    rules: Vec<CompiledRule>,
    skipped: Vec<SkippedRule>,
}

impl RuleTable {
    /// Compile definitions in order, dropping duplicates and skipping malformed matchers
    pub fn from_definitions<I>(definitions: I) -> Self
    where
        I: IntoIterator<Item = RuleDefinition>,
    {
        let mut seen = HashSet::new();
        let mut rules = Vec::new();
        let mut skipped = Vec::new();

        for definition in definitions {
            if !seen.insert((definition.pattern.clone(), definition.replacement.clone())) {
                debug!(rule_id = %definition.rule_id, "dropping duplicate rule");
                continue;
            }
            match CompiledRule::compile(definition) {
                Ok(rule) => rules.push(rule),
                Err(RuleError::InvalidPattern { rule_id, source }) => {
                    warn!(rule_id = %rule_id, error = %source, "skipping rule with malformed pattern");
                    skipped.push(SkippedRule {
                        rule_id,
                        reason: source.to_string(),
                    });
                }
            }
        }

        Self { rules, skipped }
    }

    /// The standard T-SQL → dbt table
    pub fn standard() -> Self {
        Self::from_definitions(standard_definitions())
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn skipped(&self) -> &[SkippedRule] {
        &self.skipped
    }

    pub fn apply(&self, text: &str) -> String {
        self.apply_traced(text).0
    }

    /// Apply every rule in order and report which ones changed the text
    pub fn apply_traced(&self, text: &str) -> (String, Vec<AppliedRule>) {
        let mut current = text.to_string();
        let mut applied = Vec::new();

        for rule in &self.rules {
            let (next, replacements) = rule.replace_all(&current);
            if replacements > 0 {
                debug!(rule_id = %rule.definition.rule_id, replacements, "applied rule");
                applied.push(AppliedRule {
                    rule_id: rule.definition.rule_id.clone(),
                    replacements,
                });
            }
            current = next;
        }

        (current, applied)
    }

    /// Number of rules whose matcher finds at least one match in `text`
    pub fn count_matching(&self, text: &str) -> usize {
        self.rules
            .iter()
            .filter(|rule| rule.regex.is_match(text))
            .count()
    }
}

impl Default for RuleTable {
    fn default() -> Self {
        Self::standard()
    }
}

/// Definitions of the standard table, grouped and ordered
pub fn standard_definitions() -> Vec<RuleDefinition> {
    use RuleGroup::*;

    vec![
        // Procedure boilerplate
        RuleDefinition::new(
            "procedure_header",
            Boilerplate,
            r"\bCREATE\s+(?:OR\s+ALTER\s+)?PROC(?:EDURE)?\s+[\w\[\]\.]+.*?\bAS\b(?:\s+BEGIN\b)?",
            "",
        ),
        RuleDefinition::new("set_nocount", Boilerplate, r"\bSET\s+NOCOUNT\s+ON\s*;?", ""),
        RuleDefinition::new("batch_separator", Boilerplate, r"(?m)^[ \t]*GO[ \t]*$", ""),
        RuleDefinition::new("trailing_end", Boilerplate, r"(?m)^[ \t]*END[ \t]*;?\s*\z", ""),
        // Parameters, most specific form first
        RuleDefinition::new(
            "parameter_sized",
            Parameters,
            format!(r"@(?P<name>\w+)\s+(?:{PARAMETER_TYPES})\s*\([^)]*\)(?:\s*=\s*[^,\s;)]+)?"),
            "{{ var('${name}') }}",
        ),
        RuleDefinition::new(
            "parameter_typed",
            Parameters,
            format!(r"@(?P<name>\w+)\s+(?:{PARAMETER_TYPES})\b(?:\s*=\s*[^,\s;)]+)?"),
            "{{ var('${name}') }}",
        ),
        RuleDefinition::new(
            "parameter_reference",
            Parameters,
            r"(?P<keep_system>@)?@(?P<name>\w+)",
            "{{ var('${name}') }}",
        ),
        // Built-in date/time functions
        RuleDefinition::new("getdate", Functions, r"\bGETDATE\s*\(\s*\)", "CURRENT_TIMESTAMP"),
        RuleDefinition::new(
            "datediff",
            Functions,
            r"\bDATEDIFF\s*\(\s*(?P<unit>year|quarter|month|week|day|hour|minute|second)\s*,\s*(?P<start>[^,]+?)\s*,\s*(?P<end>[^)]+?)\s*\)",
            "DATE_DIFF('${unit}', ${start}, ${end})",
        ),
        RuleDefinition::new(
            "month",
            Functions,
            r"\bMONTH\s*\(\s*(?P<arg>[^)]+?)\s*\)",
            "EXTRACT(MONTH FROM ${arg})",
        ),
        RuleDefinition::new(
            "year",
            Functions,
            r"\bYEAR\s*\(\s*(?P<arg>[^)]+?)\s*\)",
            "EXTRACT(YEAR FROM ${arg})",
        ),
        // Table references; calls and EXTRACT(... FROM x) stay as they are
        RuleDefinition::new(
            "from_table",
            TableReferences,
            r"(?P<keep_extract>\bEXTRACT\s*\(\s*\w+\s+)?\bFROM\s+(?:\w+\.)*(?P<table>\w+)(?P<keep_call>\s*\()?",
            "FROM {{ ref('${table}') }}",
        ),
        RuleDefinition::new(
            "join_table",
            TableReferences,
            r"\bJOIN\s+(?:\w+\.)*(?P<table>\w+)(?P<keep_call>\s*\()?",
            "JOIN {{ ref('${table}') }}",
        ),
        // Temp table lifecycle
        RuleDefinition::new(
            "temp_create",
            TempTables,
            r"\bCREATE\s+TABLE\s+##?(?P<name>\w+)",
            "-- Begin CTE: ${name}",
        ),
        RuleDefinition::new(
            "temp_insert",
            TempTables,
            r"\bINSERT\s+INTO\s+##?(?P<name>\w+)(?:[ \t]*\r?\n)?",
            "-- CTE: ${name} AS (\n",
        ),
        RuleDefinition::new(
            "temp_drop",
            TempTables,
            r"\bDROP\s+TABLE\s+(?:IF\s+EXISTS\s+)?##?(?P<name>\w+)\s*;?",
            "-- End CTE: ${name}",
        ),
        RuleDefinition::new("temp_sigil", TempTables, r"##?(?P<name>\w+)", "${name}"),
        // Local variables
        // One declaration per line; the terminator is optional
        RuleDefinition::new("declare", LocalVariables, r"\bDECLARE\s+[^;\r\n]*;?", ""),
        RuleDefinition::new(
            "select_assignment",
            LocalVariables,
            r"\bSELECT\s+(?:@\w+|\{\{\s*var\('\w+'\)\s*\}\})\s*=\s*",
            "SELECT ",
        ),
        RuleDefinition::new(
            "select_assignment_list",
            LocalVariables,
            r",\s*(?:@\w+|\{\{\s*var\('\w+'\)\s*\}\})\s*=\s*",
            ", ",
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn convert(text: &str) -> String {
        RuleTable::standard().apply(text)
    }

    #[test]
    fn test_standard_table_compiles_completely() {
        let table = RuleTable::standard();
        assert!(table.skipped().is_empty());
        assert_eq!(table.len(), standard_definitions().len());
    }

    #[test]
    fn test_sized_parameter_with_default() {
        let output = convert("@region VARCHAR(50) = NULL");
        assert!(output.contains("{{ var('region') }}"));
        assert!(!output.contains("NULL"));
    }

    #[test]
    fn test_parameter_list() {
        let output = convert("@region VARCHAR(50) = NULL, @start_date DATE, @end_date DATE");
        assert_eq!(
            output,
            "{{ var('region') }}, {{ var('start_date') }}, {{ var('end_date') }}"
        );
    }

    #[test]
    fn test_system_variables_untouched() {
        let output = convert("IF @@ROWCOUNT > @limit RETURN");
        assert_eq!(output, "IF @@ROWCOUNT > {{ var('limit') }} RETURN");
    }

    #[test]
    fn test_datediff_with_getdate() {
        assert_eq!(
            convert("DATEDIFF(day, order_date, GETDATE())"),
            "DATE_DIFF('day', order_date, CURRENT_TIMESTAMP)"
        );
    }

    #[test]
    fn test_month_and_year_extraction() {
        let output = convert("SELECT MONTH(order_date), YEAR(order_date) FROM orders");
        assert_eq!(
            output,
            "SELECT EXTRACT(MONTH FROM order_date), EXTRACT(YEAR FROM order_date) FROM {{ ref('orders') }}"
        );
    }

    #[test]
    fn test_table_references_keep_aliases() {
        assert_eq!(
            convert("FROM customers c JOIN orders o"),
            "FROM {{ ref('customers') }} c JOIN {{ ref('orders') }} o"
        );
    }

    #[test]
    fn test_table_references_are_case_insensitive_and_span_lines() {
        assert_eq!(
            convert("select *\nfrom\n    dbo.customers\ninner join orders o"),
            "select *\nFROM {{ ref('customers') }}\ninner JOIN {{ ref('orders') }} o"
        );
    }

    #[test]
    fn test_table_valued_calls_are_not_references() {
        assert_eq!(
            convert("SELECT * FROM dbo.fn_active_customers(1) JOIN regions r"),
            "SELECT * FROM dbo.fn_active_customers(1) JOIN {{ ref('regions') }} r"
        );
    }

    #[test]
    fn test_temp_table_lifecycle() {
        let input = "CREATE TABLE #staging (id INT)\nINSERT INTO #staging\nSELECT id FROM orders\nSELECT * FROM #staging\nDROP TABLE #staging;";
        let output = convert(input);
        assert!(output.contains("-- Begin CTE: staging"));
        assert!(output.contains("-- CTE: staging AS (\nSELECT id FROM {{ ref('orders') }}"));
        assert!(output.contains("-- End CTE: staging"));
        assert!(output.contains("SELECT * FROM staging"));
        assert!(!output.contains('#'));
    }

    #[test]
    fn test_local_variables_removed() {
        let input = "DECLARE @total DECIMAL(10,2);\nSELECT @total = SUM(amount) FROM orders;";
        let output = convert(input);
        assert_eq!(output, "\nSELECT SUM(amount) FROM {{ ref('orders') }};");
    }

    #[test]
    fn test_unterminated_declare_keeps_following_statement() {
        let output = convert("DECLARE @cutoff DATE\nSELECT id FROM orders WHERE d > @cutoff;");
        assert_eq!(
            output,
            "\nSELECT id FROM {{ ref('orders') }} WHERE d > {{ var('cutoff') }};"
        );
    }

    #[test]
    fn test_multiple_assignment_targets_removed() {
        assert_eq!(
            convert("SELECT @a = MIN(x), @b = MAX(x) FROM t;"),
            "SELECT MIN(x), MAX(x) FROM {{ ref('t') }};"
        );
    }

    #[test]
    fn test_procedure_without_begin() {
        let output = convert("CREATE PROCEDURE dbo.p @r INT AS\nSELECT x AS y FROM t\n");
        assert_eq!(output, "\nSELECT x AS y FROM {{ ref('t') }}\n");
    }

    #[test]
    fn test_case_ending_the_input_keeps_its_end() {
        assert_eq!(
            convert("SELECT CASE WHEN a = 1 THEN 'x' ELSE 'y' END"),
            "SELECT CASE WHEN a = 1 THEN 'x' ELSE 'y' END"
        );
    }

    #[test]
    fn test_procedure_boilerplate_stripped() {
        let input = "CREATE PROCEDURE dbo.sp_customer_analytics\n    @start_date DATE,\n    @region VARCHAR(50) = NULL\nAS\nBEGIN\n    SET NOCOUNT ON;\n    SELECT customer_id FROM customers WHERE region = @region\nEND\n";
        let output = convert(input);
        assert!(!output.contains("PROCEDURE"));
        assert!(!output.contains("NOCOUNT"));
        assert!(!output.trim_end().ends_with("END"));
        assert!(output.contains(
            "SELECT customer_id FROM {{ ref('customers') }} WHERE region = {{ var('region') }}"
        ));
    }

    #[test]
    fn test_only_trailing_end_is_removed() {
        let output = convert("SELECT CASE WHEN a = 1 THEN 'x' ELSE 'y' END AS flag FROM t\nEND");
        assert!(output.contains("ELSE 'y' END AS flag"));
        assert!(!output.trim_end().ends_with("END"));
    }

    #[test]
    fn test_malformed_rule_is_skipped() {
        let table = RuleTable::from_definitions(vec![
            RuleDefinition::new("broken", RuleGroup::Custom, r"(unclosed", "x"),
            RuleDefinition::new("getdate", RuleGroup::Functions, r"\bGETDATE\(\)", "CURRENT_TIMESTAMP"),
        ]);

        assert_eq!(table.len(), 1);
        assert_eq!(table.skipped().len(), 1);
        assert_eq!(table.skipped()[0].rule_id, "broken");
        assert_eq!(table.apply("SELECT GETDATE()"), "SELECT CURRENT_TIMESTAMP");
    }

    #[test]
    fn test_duplicate_rules_are_dropped() {
        let rule = RuleDefinition::new("getdate", RuleGroup::Functions, r"\bGETDATE\(\)", "NOW()");
        let table = RuleTable::from_definitions(vec![rule.clone(), rule]);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_zero_matches_is_noop() {
        assert_eq!(convert("SELECT 1"), "SELECT 1");
    }

    #[test]
    fn test_apply_traced_reports_applied_rules() {
        let (_, applied) = RuleTable::standard().apply_traced("FROM a JOIN b JOIN c");
        assert_eq!(
            applied,
            vec![
                AppliedRule { rule_id: "from_table".to_string(), replacements: 1 },
                AppliedRule { rule_id: "join_table".to_string(), replacements: 2 },
            ]
        );
    }

    #[test]
    fn test_output_is_deterministic() {
        let input = "CREATE TABLE #t (id INT)\nINSERT INTO #t SELECT id FROM orders WHERE d > GETDATE()";
        let table = RuleTable::standard();
        let first = table.apply(input);
        for _ in 0..5 {
            assert_eq!(table.apply(input), first);
        }
    }

    #[test]
    fn test_table_and_temp_groups_are_order_dependent() {
        let input = "SELECT * FROM #staging s JOIN customers c ON s.id = c.id";

        let swapped = standard_definitions().into_iter().map(|mut rule| {
            rule.group = match rule.group {
                RuleGroup::TableReferences => RuleGroup::TempTables,
                RuleGroup::TempTables => RuleGroup::TableReferences,
                other => other,
            };
            rule
        });
        let mut swapped: Vec<_> = swapped.collect();
        swapped.sort_by_key(|rule| rule.group);

        let standard_output = RuleTable::standard().apply(input);
        let swapped_output = RuleTable::from_definitions(swapped).apply(input);

        assert_eq!(
            standard_output,
            "SELECT * FROM staging s JOIN {{ ref('customers') }} c ON s.id = c.id"
        );
        assert_eq!(
            swapped_output,
            "SELECT * FROM {{ ref('staging') }} s JOIN {{ ref('customers') }} c ON s.id = c.id"
        );
        assert_ne!(standard_output, swapped_output);
    }

    #[test]
    fn test_count_matching() {
        let table = RuleTable::standard();
        assert_eq!(table.count_matching("SELECT 1"), 0);
        // getdate + from_table
        assert_eq!(table.count_matching("SELECT GETDATE() FROM orders"), 2);
    }
}
