diesel::table! {
    use diesel::sql_types::*;

    game_events (event_id) {
        event_id -> Uuid,
        aggregate_id -> Uuid,
        aggregate_type -> Varchar,
        event_type -> Varchar,
        aggregate_version -> Int8,
        global_position -> Int8,
        payload -> Jsonb,
        metadata -> Jsonb,
        occurred_at -> Timestamptz,
        recorded_at -> Timestamptz,
        causation_id -> Nullable<Uuid>,
        correlation_id -> Nullable<Uuid>,
    }
}

diesel::table! {
    use diesel::sql_types::*;

    aggregate_snapshots (snapshot_id) {
        snapshot_id -> Uuid,
        aggregate_id -> Uuid,
        aggregate_type -> Varchar,
        aggregate_version -> Int8,
        codec -> Varchar,
        compression -> Varchar,
        state -> Bytea,
        created_at -> Timestamptz,
        metadata -> Jsonb,
    }
}

diesel::allow_tables_to_appear_in_same_query!(game_events, aggregate_snapshots);
