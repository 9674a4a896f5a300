#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use crate::enums::*;
    use crate::events::{Event, EventKind, SyncEnvelope};
    use crate::order::{Order, OrderIntent, OrderTarget};
    use crate::participant::{effective_director_index, Participant};
    use crate::state::{MatchBoard, MatchSnapshot, Viewer};
    use crate::types::{polygon_contains, Bounds, LatLng, Sector, UnitElement, Zone};

    fn zone(team: Team) -> Zone {
        let coordinates = vec![LatLng::new(40.0, -3.0), LatLng::new(40.1, -2.9)];
        Zone {
            team,
            bounds: Bounds::enclosing(&coordinates).unwrap(),
            coordinates,
            style: None,
        }
    }

    fn element(id: &str, team: Team) -> UnitElement {
        UnitElement {
            id: id.into(),
            team,
            label: String::new(),
            position: LatLng::new(40.05, -2.95),
            creator_id: "p1".into(),
        }
    }

    fn snapshot(zones: Vec<Zone>) -> MatchSnapshot {
        MatchSnapshot {
            phase: Phase::Preparation,
            subphase: Subphase::Deployment,
            sector: None,
            zones,
            elements: vec![element("u1", Team::Blue)],
            participants: Vec::new(),
            turn_number: 0,
            active_participant_id: None,
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        }
    }

    // ---- Wire format ----

    #[test]
    fn test_envelope_wire_shape() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let env = SyncEnvelope::at(
            Event::TurnChanged {
                active_participant_id: "p2".into(),
                turn_number: 3,
            },
            "p1",
            ts,
        );
        let value = serde_json::to_value(&env).unwrap();
        assert_eq!(value["event"], "cambioTurno");
        assert_eq!(value["payload"]["activeParticipantId"], "p2");
        assert_eq!(value["payload"]["turnNumber"], 3);
        assert_eq!(value["originParticipantId"], "p1");
        assert_eq!(value["timestamp"], "2024-05-01T12:00:00Z");

        let back: SyncEnvelope = serde_json::from_value(value).unwrap();
        assert_eq!(back, env);
    }

    #[test]
    fn test_estado_actual_alias_decodes_as_full_state() {
        let value = json!({
            "event": "estadoActual",
            "payload": {
                "phase": "combat",
                "subphase": "movement",
                "timestamp": "2024-05-01T12:00:00Z"
            },
            "originParticipantId": "relay",
            "timestamp": "2024-05-01T12:00:01Z"
        });
        let env: SyncEnvelope = serde_json::from_value(value).unwrap();
        assert_eq!(env.kind(), EventKind::FullState);
        match env.event {
            Event::FullState(snap) => {
                assert_eq!(snap.phase, Phase::Combat);
                assert_eq!(snap.subphase, Subphase::Movement);
                assert!(snap.zones.is_empty());
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_turn_ended_payload_fields() {
        let value = serde_json::to_value(Event::TurnEnded {
            participant_id: "p3".into(),
            turn_number: 2,
            forced: true,
        })
        .unwrap();
        assert_eq!(
            value,
            json!({
                "event": "finTurno",
                "payload": {"participantId": "p3", "turnNumber": 2, "forced": true}
            })
        );
    }

    #[test]
    fn test_unknown_event_name_is_rejected() {
        let value = json!({
            "event": "bailar",
            "payload": {},
            "originParticipantId": "p1",
            "timestamp": "2024-05-01T12:00:00Z"
        });
        assert!(serde_json::from_value::<SyncEnvelope>(value).is_err());
    }

    #[test]
    fn test_wire_names_match_kinds() {
        let event = Event::DeploymentReady {
            participant_id: "p1".into(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], event.kind().wire_name());
        assert_eq!(EventKind::ElementMoved.to_string(), "elementoMovido");
    }

    // ---- Director rule ----

    #[test]
    fn test_explicit_director_wins() {
        let roster = vec![
            Participant::new("a", "A", Team::Blue),
            Participant::new("b", "B", Team::Red).director(),
        ];
        assert_eq!(effective_director_index(&roster, Team::Blue), Some(1));
    }

    #[test]
    fn test_temporary_director_is_first_of_default_team() {
        let roster = vec![
            Participant::new("r", "R", Team::Red),
            Participant::new("b1", "B1", Team::Blue),
            Participant::new("b2", "B2", Team::Blue),
        ];
        assert_eq!(effective_director_index(&roster, Team::Blue), Some(1));
        assert_eq!(effective_director_index(&roster[..1], Team::Blue), None);
    }

    // ---- Board ----

    #[test]
    fn test_player_only_merges_own_team_zone() {
        let mut board = MatchBoard::new();
        let viewer = Viewer {
            team: Team::Red,
            is_director: false,
        };
        board.merge_snapshot(&snapshot(vec![zone(Team::Blue), zone(Team::Red)]), viewer);
        assert!(board.has_zone(Team::Red));
        assert!(!board.has_zone(Team::Blue));
        assert_eq!(board.elements.len(), 1);
    }

    #[test]
    fn test_director_merges_every_zone() {
        let mut board = MatchBoard::new();
        let viewer = Viewer {
            team: Team::Unassigned,
            is_director: true,
        };
        board.merge_snapshot(&snapshot(vec![zone(Team::Blue), zone(Team::Red)]), viewer);
        assert!(board.has_zone(Team::Blue));
        assert!(board.has_zone(Team::Red));
    }

    #[test]
    fn test_snapshot_without_sector_keeps_local_sector() {
        let mut board = MatchBoard::new();
        board.sector = Some(Sector::default());
        let viewer = Viewer {
            team: Team::Blue,
            is_director: false,
        };
        board.merge_snapshot(&snapshot(Vec::new()), viewer);
        assert!(board.sector.is_some());
    }

    #[test]
    fn test_bounds_enclosing_and_contains() {
        let b = Bounds::enclosing(&[
            LatLng::new(1.0, 5.0),
            LatLng::new(-1.0, 2.0),
            LatLng::new(0.5, 3.0),
        ])
        .unwrap();
        assert_eq!(b.south_west, LatLng::new(-1.0, 2.0));
        assert_eq!(b.north_east, LatLng::new(1.0, 5.0));
        assert!(b.contains(&LatLng::new(0.0, 4.0)));
        assert!(!b.contains(&LatLng::new(2.0, 4.0)));
        assert!(Bounds::enclosing(&[]).is_none());
        assert!(Bounds::new(LatLng::new(0.0, 0.0), LatLng::new(0.0, 1.0)).is_degenerate());
    }

    #[test]
    fn test_triangle_sector_excludes_far_corner() {
        let coordinates = vec![
            LatLng::new(0.0, 0.0),
            LatLng::new(0.0, 1.0),
            LatLng::new(1.0, 0.0),
        ];
        let sector = Sector {
            bounds: Bounds::enclosing(&coordinates).unwrap(),
            coordinates,
        };
        assert!(sector.contains(&LatLng::new(0.1, 0.1)));
        assert!(sector.contains(&LatLng::new(0.5, 0.5)), "hypotenuse counts as inside");
        assert!(sector.contains(&LatLng::new(0.0, 0.0)));
        assert!(!sector.contains(&LatLng::new(0.95, 0.95)));
        assert!(sector.bounds.contains(&LatLng::new(0.95, 0.95)));
        assert!(!polygon_contains(&sector.coordinates[..2], &LatLng::new(0.0, 0.5)));
    }

    // ---- Enums ----

    #[test]
    fn test_subphase_belongs_to_phase() {
        assert_eq!(Subphase::ZoneDefinition.phase(), Phase::Preparation);
        assert_eq!(Subphase::Review.phase(), Phase::Combat);
        assert!(Subphase::Movement.ordinal() > Subphase::Deployment.ordinal());
    }

    #[test]
    fn test_subphase_snake_case_on_wire() {
        let json = serde_json::to_string(&Subphase::SectorDefinition).unwrap();
        assert_eq!(json, "\"sector_definition\"");
        let team: Team = serde_json::from_str("\"red\"").unwrap();
        assert_eq!(team, Team::Red);
    }

    #[test]
    fn test_order_from_intent_starts_pending() {
        let intent = OrderIntent {
            unit_id: "u1".into(),
            team: Team::Blue,
            kind: OrderKind::Wait,
            target: OrderTarget::None,
            priority: 2,
            duration_secs: Some(15.0),
        };
        let order = Order::from_intent(7, intent, None);
        assert_eq!(order.state, OrderState::Pending);
        assert_eq!(order.estimated_duration_secs, 15.0);
    }
}
