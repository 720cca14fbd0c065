mod common;

use assert_matches::assert_matches;

use omero_arc::attributes::{
    ASSAY_METADATA_NS, ASSAY_PERFORMERS_NS, INVESTIGATION_CONTACTS_NS, INVESTIGATION_NS,
    STUDY_FACTORS_NS, STUDY_METADATA_NS, STUDY_PUBLICATIONS_NS,
};
use omero_arc::domain::Annotation;
use omero_arc::error::ArcError;
use omero_arc::mapper::{AssayMapper, InvestigationMapper, IsaMapper, StudyMapper};

use common::{dataset, project, strings};

fn study_annotations() -> Vec<Annotation> {
    vec![
        Annotation::new(
            STUDY_METADATA_NS,
            &[
                ("Study Identifier", "my-custom-study-id"),
                ("Study Title", "My Custom Study Title"),
                ("Study Description", "My custom description."),
                ("Study Submission Date", "8/11/2022"),
                ("Study Public Release Date", "3/3/2023"),
            ],
        ),
        Annotation::new(
            STUDY_PUBLICATIONS_NS,
            &[
                ("Study Publication DOI", "10.1038/s41467-022-34205-9"),
                ("Study Publication PubMed ID", "678978"),
                ("Study Publication Author List", "Mueller M, Langer L L"),
                ("Study Publication Status", "published"),
            ],
        ),
        Annotation::new(
            STUDY_PUBLICATIONS_NS,
            &[
                ("Study Publication DOI", "10.567/s56878-890890-330-3"),
                ("Study Publication PubMed ID", "7898961"),
            ],
        ),
        Annotation::new(
            STUDY_FACTORS_NS,
            &[
                ("Study Factor Name", "My Factor"),
                ("Study Factor Type", "Factor for test reasons"),
                ("Study Design Type Term Source REF", "EFO"),
            ],
        ),
        Annotation::new("some:other:namespace", &[("Study Title", "ignored")]),
    ]
}

#[test]
fn study_without_annotations_uses_project_defaults() {
    let mapper = StudyMapper::new(&project(1, "My First Study"), Vec::new()).unwrap();
    assert_eq!(mapper.study_identifier().unwrap(), "my-first-study");

    let commands = mapper.arccommander_commands().unwrap();
    assert_eq!(commands.len(), 2);
    assert_eq!(
        commands[0],
        strings(&[
            "arc",
            "study",
            "add",
            "--identifier",
            "my-first-study",
            "--title",
            "My First Study",
            "--description",
            "",
        ])
    );
    assert_eq!(
        commands[1],
        strings(&[
            "arc",
            "study",
            "person",
            "register",
            "--studyidentifier",
            "my-first-study",
            "--lastname",
            "Lovelace",
            "--firstname",
            "Ada",
            "--email",
            "ada@example.org",
        ])
    );
}

#[test]
fn study_annotations_override_defaults() {
    let mapper = StudyMapper::new(&project(1, "My First Study"), study_annotations()).unwrap();
    assert_eq!(mapper.study_identifier().unwrap(), "my-custom-study-id");

    let commands = mapper.arccommander_commands().unwrap();
    // metadata, two publications, one factor, contacts
    assert_eq!(commands.len(), 5);
    assert_eq!(
        commands[0],
        strings(&[
            "arc",
            "study",
            "add",
            "--identifier",
            "my-custom-study-id",
            "--title",
            "My Custom Study Title",
            "--description",
            "My custom description.",
            "--submissiondate",
            "8/11/2022",
            "--publicreleasedate",
            "3/3/2023",
        ])
    );
    assert_eq!(
        commands[1],
        strings(&[
            "arc",
            "study",
            "publication",
            "register",
            "--studyidentifier",
            "my-custom-study-id",
            "--doi",
            "10.1038/s41467-022-34205-9",
            "--pubmedid",
            "678978",
            "--authorlist",
            "Mueller M, Langer L L",
            "--status",
            "published",
        ])
    );
    assert_eq!(
        commands[2],
        strings(&[
            "arc",
            "study",
            "publication",
            "register",
            "--studyidentifier",
            "my-custom-study-id",
            "--doi",
            "10.567/s56878-890890-330-3",
            "--pubmedid",
            "7898961",
        ])
    );
    assert_eq!(
        commands[3],
        strings(&[
            "arc",
            "study",
            "factor",
            "register",
            "--studyidentifier",
            "my-custom-study-id",
            "--name",
            "My Factor",
            "--factortype",
            "Factor for test reasons",
        ])
    );
}

#[test]
fn publications_yield_one_record_per_annotation() {
    let mapper = StudyMapper::new(&project(1, "My First Study"), study_annotations()).unwrap();
    let publications = mapper.attributes().category("publications").unwrap();
    assert_eq!(publications.values.len(), 2);
    assert_ne!(publications.values[0], publications.values[1]);
    // No carry-over: the second record never saw an author list.
    assert_eq!(
        publications.values[1].get("Study Publication Author List"),
        None
    );
    assert_eq!(mapper.attributes().annotation_data("publications").len(), 2);
    assert_eq!(mapper.attributes().annotation_data("metadata").len(), 1);
}

#[test]
fn empty_categories_are_omitted() {
    let mapper = StudyMapper::new(&project(1, "My First Study"), Vec::new()).unwrap();
    let names: Vec<&str> = mapper
        .attributes()
        .categories()
        .iter()
        .map(|category| category.name)
        .collect();
    assert_eq!(names, vec!["metadata", "contacts"]);
}

#[test]
fn duplicate_metadata_annotation_is_rejected() {
    let annotations = vec![
        Annotation::new(STUDY_METADATA_NS, &[("Study Title", "one")]),
        Annotation::new(STUDY_METADATA_NS, &[("Study Title", "two")]),
    ];
    let err = StudyMapper::new(&project(1, "p"), annotations).unwrap_err();
    assert_matches!(err, ArcError::DuplicateAnnotation { count: 2, .. });
}

#[test]
fn investigation_defaults_and_annotations() {
    let plain = InvestigationMapper::new(&project(1, "p"), Vec::new()).unwrap();
    let commands = plain.arccommander_commands().unwrap();
    assert_eq!(
        commands[0],
        strings(&[
            "arc",
            "investigation",
            "create",
            "--identifier",
            "default-investigation-id",
        ])
    );

    let annotated = InvestigationMapper::new(
        &project(1, "p"),
        vec![
            Annotation::new(
                INVESTIGATION_NS,
                &[
                    ("Investigation Identifier", "my-custom-investigation-id"),
                    ("Investigation Title", "Mitochondria in HeLa Cells"),
                ],
            ),
            Annotation::new(
                INVESTIGATION_CONTACTS_NS,
                &[
                    ("Investigation Person Last Name", "Mueller"),
                    ("Investigation Person First Name", "Arno"),
                    ("Investigation Person Roles", "researcher"),
                ],
            ),
        ],
    )
    .unwrap();
    let commands = annotated.arccommander_commands().unwrap();
    assert_eq!(commands.len(), 2);
    assert_eq!(
        commands[0],
        strings(&[
            "arc",
            "investigation",
            "create",
            "--identifier",
            "my-custom-investigation-id",
            "--title",
            "Mitochondria in HeLa Cells",
        ])
    );
    // Owner email fills the gap the annotation leaves.
    assert_eq!(
        commands[1],
        strings(&[
            "arc",
            "investigation",
            "person",
            "register",
            "--lastname",
            "Mueller",
            "--firstname",
            "Arno",
            "--email",
            "ada@example.org",
            "--roles",
            "researcher",
        ])
    );
}

#[test]
fn assay_identifier_defaults_to_dataset_name() {
    let mapper = AssayMapper::new(&dataset(3, "Dataset One"), Vec::new(), "my-study").unwrap();
    assert_eq!(mapper.assay_identifier().unwrap(), "dataset-one");

    let commands = mapper.arccommander_commands().unwrap();
    assert_eq!(
        &commands[0][..7],
        &strings(&[
            "arc",
            "assay",
            "add",
            "--studyidentifier",
            "my-study",
            "--assayidentifier",
            "dataset-one",
        ])[..]
    );
}

#[test]
fn assay_performers_use_resolved_identifier() {
    let mapper = AssayMapper::new(
        &dataset(3, "Dataset One"),
        vec![
            Annotation::new(
                ASSAY_METADATA_NS,
                &[("Assay Identifier", "my-custom-assay-id")],
            ),
            Annotation::new(
                ASSAY_PERFORMERS_NS,
                &[
                    ("Last Name", "Mueller"),
                    ("First Name", "Arno"),
                ],
            ),
            Annotation::new(
                ASSAY_PERFORMERS_NS,
                &[
                    ("Last Name", "Berg"),
                    ("First Name", "Jana"),
                ],
            ),
        ],
        "my-study",
    )
    .unwrap();
    assert_eq!(mapper.assay_identifier().unwrap(), "my-custom-assay-id");

    let performers: Vec<Vec<String>> = mapper
        .arccommander_commands()
        .unwrap()
        .into_iter()
        .filter(|command| command[2] == "person")
        .collect();
    assert_eq!(performers.len(), 2);
    for command in &performers {
        assert_eq!(
            &command[..6],
            &strings(&[
                "arc",
                "assay",
                "person",
                "register",
                "--assayidentifier",
                "my-custom-assay-id",
            ])[..]
        );
    }
    assert!(performers[0].contains(&"Mueller".to_string()));
    assert!(performers[1].contains(&"Berg".to_string()));
}
