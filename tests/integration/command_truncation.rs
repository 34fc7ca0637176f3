//! Frame decoding at the log tail: any truncated frame reads as "end of
//! log" (`Ok(None)`), while bit damage inside a complete frame is reported
//! as corruption, never silently accepted.

use proptest::prelude::*;
use smallvec::smallvec;

use tenebra::index::SchemaRule;
use tenebra::record::{
    Command, DynamicLabelRecord, LabelStorage, LabelTokenRecord, NodeRecord, PropKeyTokenRecord,
    PropertyOwner, PropertyRecord, RelTypeTokenRecord, RelationshipRecord, SchemaRuleRecord,
};
use tenebra::types::{DynamicId, RuleId};
use tenebra::{KernelError, LabelId, NodeId, PropKeyId, PropertyValue, RelId, RelTypeId};

fn sample_commands() -> Vec<Command> {
    let node_after = NodeRecord {
        id: NodeId(7),
        in_use: true,
        created: true,
        labels: LabelStorage::Inline(smallvec![LabelId(1), LabelId(2)]),
    };
    let rel_after = RelationshipRecord {
        id: RelId(3),
        in_use: true,
        created: true,
        start_node: NodeId(7),
        end_node: NodeId(9),
        rel_type: RelTypeId(1),
    };
    let prop_after = PropertyRecord {
        owner: PropertyOwner::Node(NodeId(7)),
        key: PropKeyId(4),
        in_use: true,
        created: true,
        value: Some(PropertyValue::from("payload")),
    };
    let rule_after = SchemaRuleRecord {
        id: RuleId(1),
        in_use: true,
        created: true,
        rule: SchemaRule::UniquenessConstraint {
            label: LabelId(1),
            property_key: PropKeyId(4),
            owned_index: RuleId(0),
        },
    };
    vec![
        Command::PropKeyToken(PropKeyTokenRecord {
            id: PropKeyId(4),
            name: "name".into(),
        }),
        Command::LabelToken(LabelTokenRecord {
            id: LabelId(1),
            name: "Person".into(),
        }),
        Command::RelTypeToken(RelTypeTokenRecord {
            id: RelTypeId(1),
            name: "KNOWS".into(),
        }),
        Command::Node {
            before: NodeRecord::unused(NodeId(7)),
            after: node_after,
        },
        Command::Relationship {
            before: RelationshipRecord::unused(RelId(3)),
            after: rel_after,
        },
        Command::Property {
            before: PropertyRecord::unused(PropertyOwner::Node(NodeId(7)), PropKeyId(4)),
            after: prop_after,
        },
        Command::DynamicLabel(DynamicLabelRecord {
            id: DynamicId(0),
            in_use: true,
            created: true,
            owner: NodeId(7),
            labels: (0..8).map(LabelId).collect(),
        }),
        Command::SchemaRule {
            before: SchemaRuleRecord {
                id: RuleId(1),
                in_use: false,
                created: false,
                rule: rule_after.rule.clone(),
            },
            after: rule_after,
        },
    ]
}

#[test]
fn every_strict_prefix_of_every_command_reads_as_end_of_log() -> tenebra::Result<()> {
    for command in sample_commands() {
        let mut frame = Vec::new();
        command.encode(&mut frame);
        for cut in 0..frame.len() {
            let mut buf = &frame[..cut];
            assert_eq!(
                Command::decode(&mut buf)?,
                None,
                "prefix of {cut}/{} bytes must read as truncation",
                frame.len()
            );
        }
        let mut buf = &frame[..];
        assert_eq!(Command::decode(&mut buf)?, Some(command));
    }
    Ok(())
}

#[test]
fn payload_damage_is_corruption_not_truncation() {
    for command in sample_commands() {
        let mut frame = Vec::new();
        command.encode(&mut frame);
        // Flip one payload byte; the header and checksum stay intact.
        frame[5] ^= 0x01;
        let mut buf = &frame[..];
        let err = Command::decode(&mut buf).unwrap_err();
        assert!(matches!(err, KernelError::Corruption(_)));
    }
}

#[test]
fn unknown_tag_is_corruption() {
    let mut frame = Vec::new();
    sample_commands()[0].encode(&mut frame);
    frame[0] = 0xEE;
    let mut buf = &frame[..];
    assert!(matches!(
        Command::decode(&mut buf),
        Err(KernelError::Corruption("unknown command tag"))
    ));
}

#[test]
fn empty_input_is_end_of_log() -> tenebra::Result<()> {
    let mut buf: &[u8] = &[];
    assert_eq!(Command::decode(&mut buf)?, None);
    Ok(())
}

proptest! {
    #[test]
    fn token_frames_survive_any_name_and_any_cut(
        name in ".{0,40}",
        id in 0u32..1_000,
        cut_fraction in 0.0f64..1.0,
    ) {
        let command = Command::LabelToken(LabelTokenRecord {
            id: LabelId(id),
            name,
        });
        let mut frame = Vec::new();
        command.encode(&mut frame);

        let cut = (frame.len() as f64 * cut_fraction) as usize;
        let mut buf = &frame[..cut.min(frame.len() - 1)];
        prop_assert_eq!(Command::decode(&mut buf).unwrap(), None);

        let mut buf = &frame[..];
        prop_assert_eq!(Command::decode(&mut buf).unwrap(), Some(command));
    }

    #[test]
    fn property_frames_round_trip_any_value(
        int in any::<i64>(),
        text in ".{0,64}",
        bytes in proptest::collection::vec(any::<u8>(), 0..64),
    ) {
        for value in [
            PropertyValue::Int(int),
            PropertyValue::from(text.as_str()),
            PropertyValue::Bytes(bytes.clone()),
        ] {
            let command = Command::Property {
                before: PropertyRecord::unused(PropertyOwner::Node(NodeId(1)), PropKeyId(2)),
                after: PropertyRecord {
                    owner: PropertyOwner::Node(NodeId(1)),
                    key: PropKeyId(2),
                    in_use: true,
                    created: true,
                    value: Some(value),
                },
            };
            let mut frame = Vec::new();
            command.encode(&mut frame);
            let mut buf = &frame[..];
            prop_assert_eq!(Command::decode(&mut buf).unwrap(), Some(command));
        }
    }
}
