//! Static ISA attribute tables: which annotation namespace feeds which ARC
//! Commander command, with per-field defaults and flags.

use crate::domain::{Dataset, Experimenter, Project, fmt_identifier};

pub const METADATA: &str = "metadata";

pub const INVESTIGATION_NS: &str = "ARC:ISA:INVESTIGATION:INVESTIGATION";
pub const INVESTIGATION_PUBLICATIONS_NS: &str = "ARC:ISA:INVESTIGATION:INVESTIGATION PUBLICATIONS";
pub const INVESTIGATION_CONTACTS_NS: &str = "ARC:ISA:INVESTIGATION:INVESTIGATION CONTACTS";
pub const STUDY_METADATA_NS: &str = "ARC:ISA:STUDY:STUDY METADATA";
pub const STUDY_PUBLICATIONS_NS: &str = "ARC:ISA:STUDY:STUDY PUBLICATIONS";
pub const STUDY_DESIGN_NS: &str = "ARC:ISA:STUDY:STUDY DESIGN DESCRIPTORS";
pub const STUDY_FACTORS_NS: &str = "ARC:ISA:STUDY:STUDY FACTORS";
pub const STUDY_PROTOCOLS_NS: &str = "ARC:ISA:STUDY:STUDY PROTOCOLS";
pub const STUDY_CONTACTS_NS: &str = "ARC:ISA:STUDY:STUDY CONTACTS";
pub const ASSAY_METADATA_NS: &str = "ARC:ISA:ASSAY:ASSAY METADATA";
pub const ASSAY_PERFORMERS_NS: &str = "ARC:ISA:ASSAY:ASSAY PERFORMERS";

pub const DEFAULT_INVESTIGATION_ID: &str = "default-investigation-id";

/// One token of a command prefix. Identifiers are looked up when the
/// command is rendered, after annotations have been merged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandToken {
    Literal(String),
    StudyIdentifier,
    AssayIdentifier,
}

#[derive(Debug, Clone)]
pub struct CategoryConfig {
    pub name: &'static str,
    pub namespace: &'static str,
    pub defaults: Vec<(&'static str, Option<String>)>,
    pub command: Vec<CommandToken>,
    pub options: Vec<(&'static str, &'static str)>,
}

impl CategoryConfig {
    pub fn option(&self, field: &str) -> Option<&'static str> {
        self.options
            .iter()
            .find(|(name, _)| *name == field)
            .map(|(_, flag)| *flag)
    }

    pub fn is_single_valued(&self) -> bool {
        self.name == METADATA
    }
}

fn literal(tokens: &[&str]) -> Vec<CommandToken> {
    tokens
        .iter()
        .map(|token| CommandToken::Literal(token.to_string()))
        .collect()
}

fn with_study(tokens: &[&str]) -> Vec<CommandToken> {
    let mut command = literal(tokens);
    command.push(CommandToken::Literal("--studyidentifier".to_string()));
    command.push(CommandToken::StudyIdentifier);
    command
}

fn unset(fields: &[&'static str]) -> Vec<(&'static str, Option<String>)> {
    fields.iter().map(|field| (*field, None)).collect()
}

fn publications(
    name: &'static str,
    namespace: &'static str,
    fields: [&'static str; 7],
    command: Vec<CommandToken>,
) -> CategoryConfig {
    let flags = [
        "--doi",
        "--pubmedid",
        "--authorlist",
        "--title",
        "--status",
        "--statustermaccessionnumber",
        "--statustermsourceref",
    ];
    CategoryConfig {
        name,
        namespace,
        defaults: unset(&fields),
        command,
        options: fields.into_iter().zip(flags).collect(),
    }
}

/// Person tables share flags across levels; `fields` lists Last Name,
/// First Name, Mid Initials, Email, Phone, Fax, Address, Affiliation,
/// orcid, Roles, Roles Term Accession Number, Roles Term Source REF.
fn persons(
    name: &'static str,
    namespace: &'static str,
    fields: [&'static str; 12],
    command: Vec<CommandToken>,
    owner: &Experimenter,
) -> CategoryConfig {
    let flags = [
        "--lastname",
        "--firstname",
        "--midinitials",
        "--email",
        "--phone",
        "--fax",
        "--address",
        "--affiliation",
        "--orcid",
        "--roles",
        "--rolestermaccessionnumber",
        "--rolestermsourceref",
    ];
    // Mid initials are accepted by the CLI but never resolved.
    let mut defaults = vec![
        (fields[0], owner.last_name.clone()),
        (fields[1], owner.first_name.clone()),
        (fields[3], owner.email.clone()),
    ];
    defaults.extend(unset(&fields[4..]));
    CategoryConfig {
        name,
        namespace,
        defaults,
        command,
        options: fields.into_iter().zip(flags).collect(),
    }
}

pub fn investigation_config(project: &Project) -> Vec<CategoryConfig> {
    vec![
        CategoryConfig {
            name: "investigation",
            namespace: INVESTIGATION_NS,
            defaults: vec![
                (
                    "Investigation Identifier",
                    Some(DEFAULT_INVESTIGATION_ID.to_string()),
                ),
                ("Investigation Title", None),
                ("Investigation Description", None),
                ("Investigation Submission Date", None),
                ("Investigation Public Release Date", None),
            ],
            command: literal(&["arc", "investigation", "create"]),
            options: vec![
                ("Investigation Identifier", "--identifier"),
                ("Investigation Title", "--title"),
                ("Investigation Description", "--description"),
                ("Investigation Submission Date", "--submissiondate"),
                ("Investigation Public Release Date", "--publicreleasedate"),
            ],
        },
        publications(
            "publications",
            INVESTIGATION_PUBLICATIONS_NS,
            [
                "Investigation Publication DOI",
                "Investigation Publication PubMed ID",
                "Investigation Publication Author List",
                "Investigation Publication Title",
                "Investigation Publication Status",
                "Investigation Publication Status Term Accession Number",
                "Investigation Publication Status Term Source REF",
            ],
            literal(&["arc", "investigation", "publication", "register"]),
        ),
        persons(
            "contacts",
            INVESTIGATION_CONTACTS_NS,
            [
                "Investigation Person Last Name",
                "Investigation Person First Name",
                "Investigation Person Mid Initials",
                "Investigation Person Email",
                "Investigation Person Phone",
                "Investigation Person Fax",
                "Investigation Person Address",
                "Investigation Person Affiliation",
                "Investigation Person orcid",
                "Investigation Person Roles",
                "Investigation Person Roles Term Accession Number",
                "Investigation Person Roles Term Source REF",
            ],
            literal(&["arc", "investigation", "person", "register"]),
            &project.owner,
        ),
    ]
}

pub fn study_config(project: &Project) -> Vec<CategoryConfig> {
    vec![
        CategoryConfig {
            name: METADATA,
            namespace: STUDY_METADATA_NS,
            defaults: vec![
                ("Study Identifier", Some(fmt_identifier(&project.name))),
                ("Study Title", Some(project.name.clone())),
                (
                    "Study Description",
                    Some(project.description.clone().unwrap_or_default()),
                ),
                ("Study Submission Date", None),
                ("Study Public Release Date", None),
            ],
            command: literal(&["arc", "study", "add"]),
            options: vec![
                ("Study Identifier", "--identifier"),
                ("Study Title", "--title"),
                ("Study Description", "--description"),
                ("Study Submission Date", "--submissiondate"),
                ("Study Public Release Date", "--publicreleasedate"),
            ],
        },
        publications(
            "publications",
            STUDY_PUBLICATIONS_NS,
            [
                "Study Publication DOI",
                "Study Publication PubMed ID",
                "Study Publication Author List",
                "Study Publication Title",
                "Study Publication Status",
                "Study Publication Status Term Accession Number",
                "Study Publication Status Term Source REF",
            ],
            with_study(&["arc", "study", "publication", "register"]),
        ),
        CategoryConfig {
            name: "design",
            namespace: STUDY_DESIGN_NS,
            defaults: unset(&[
                "Study Design Type",
                "Study Design Type Term Accession Number",
                "Study Design Type Term Source REF",
            ]),
            command: with_study(&["arc", "study", "design", "register"]),
            options: vec![
                ("Study Design Type", "--designtype"),
                (
                    "Study Design Type Term Accession Number",
                    "--typetermaccessionnumber",
                ),
                ("Study Design Type Term Source REF", "--typetermsourceref"),
            ],
        },
        CategoryConfig {
            name: "factors",
            namespace: STUDY_FACTORS_NS,
            defaults: unset(&[
                "Study Factor Name",
                "Study Factor Type",
                "Study Factor Type Term Accession Number",
                "Study Factor Type Term Source REF",
            ]),
            command: with_study(&["arc", "study", "factor", "register"]),
            options: vec![
                ("Study Factor Name", "--name"),
                ("Study Factor Type", "--factortype"),
                (
                    "Study Factor Type Term Accession Number",
                    "--typetermaccessionnumber",
                ),
                ("Study Factor Type Term Source REF", "--typetermsourceref"),
            ],
        },
        study_protocols(),
        persons(
            "contacts",
            STUDY_CONTACTS_NS,
            [
                "Study Person Last Name",
                "Study Person First Name",
                "Study Person Mid Initials",
                "Study Person Email",
                "Study Person Phone",
                "Study Person Fax",
                "Study Person Address",
                "Study Person Affiliation",
                "Study Person orcid",
                "Study Person Roles",
                "Study Person Roles Term Accession Number",
                "Study Person Roles Term Source REF",
            ],
            with_study(&["arc", "study", "person", "register"]),
            &project.owner,
        ),
    ]
}

fn study_protocols() -> CategoryConfig {
    let options = vec![
        ("Study Protocol Name", "--name"),
        ("Study Protocol Type", "--protocoltype"),
        (
            "Study Protocol Type Term Accession Number",
            "--typetermaccessionnumber",
        ),
        ("Study Protocol Type Term Source REF", "--typetermsourceref"),
        ("Study Protocol Description", "--description"),
        ("Study Protocol URI", "--uri"),
        ("Study Protocol Version", "--version"),
        ("Study Protocol Parameters Name", "--parametersname"),
        (
            "Study Protocol Parameters Term Accession Number",
            "--parameterstermaccessionnumber",
        ),
        (
            "Study Protocol Parameters Term Source REF",
            "--parameterstermsourceref",
        ),
        ("Study Protocol Components Name", "--componentsname"),
        ("Study Protocol Components Type", "--componentstype"),
        (
            "Study Protocol Components Type Term Accession Number",
            "--componentstypetermaccessionnumber",
        ),
        (
            "Study Protocol Components Type Term Source REF",
            "--componentstypetermsourceref",
        ),
    ];
    let fields = options.iter().map(|(field, _)| *field).collect::<Vec<_>>();
    CategoryConfig {
        name: "protocols",
        namespace: STUDY_PROTOCOLS_NS,
        defaults: unset(&fields),
        command: with_study(&["arc", "study", "protocol", "register"]),
        options,
    }
}

pub fn assay_config(dataset: &Dataset, study_identifier: &str) -> Vec<CategoryConfig> {
    let mut metadata_command = literal(&["arc", "assay", "add", "--studyidentifier"]);
    metadata_command.push(CommandToken::Literal(study_identifier.to_string()));

    let mut performers_command = literal(&["arc", "assay", "person", "register", "--assayidentifier"]);
    performers_command.push(CommandToken::AssayIdentifier);

    vec![
        CategoryConfig {
            name: METADATA,
            namespace: ASSAY_METADATA_NS,
            defaults: vec![
                ("Assay Identifier", Some(fmt_identifier(&dataset.name))),
                ("Measurement Type", None),
                ("Measurement Type Term Accession Number", None),
                ("Measurement Type Term Source REF", None),
                ("Technology Type", None),
                ("Technology Type Term Accession Number", None),
                ("Technology Type Term Source Ref", None),
                ("Technolology Platform", None),
            ],
            command: metadata_command,
            // The ARC Commander swaps term accession and source for these
            // two annotations, so the flags are crossed here to land right.
            options: vec![
                ("Assay Identifier", "--assayidentifier"),
                ("Measurement Type", "--measurementtype"),
                (
                    "Measurement Type Term Accession Number",
                    "--measurementtypetermsourceref",
                ),
                (
                    "Measurement Type Term Source REF",
                    "--measurementtypetermaccessionnumber",
                ),
                ("Technology Type", "--technologytype"),
                (
                    "Technology Type Term Accession Number",
                    "--technologytypetermsourceref",
                ),
                (
                    "Technology Type Term Source Ref",
                    "--technologytypetermaccessionnumber",
                ),
                ("Technolology Platform", "--technologyplatform"),
            ],
        },
        persons(
            "contacts",
            ASSAY_PERFORMERS_NS,
            [
                "Last Name",
                "First Name",
                "Mid Initials",
                "Email",
                "Phone",
                "Fax",
                "Address",
                "Affiliation",
                "orcid",
                "Roles",
                "Roles Term Accession Number",
                "Roles Term Source REF",
            ],
            performers_command,
            &dataset.owner,
        ),
    ]
}
