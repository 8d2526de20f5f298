diesel::table! {
    repo_states (id) {
        id -> Integer,
        name -> Text,
        #[sql_name = "type"]
        kind -> Text,
        url -> Text,
        version -> Text,
        metadata -> Jsonb,
        package_descriptors -> Jsonb,
        created_at -> Text,
    }
}

diesel::table! {
    sets (id) {
        id -> Integer,
        distribution -> Text,
        name -> Text,
        last_updated -> Nullable<Text>,
    }
}

diesel::table! {
    set_repo_states (set_id, repo_state_id) {
        set_id -> Integer,
        repo_state_id -> Integer,
    }
}

diesel::joinable!(set_repo_states -> repo_states (repo_state_id));
diesel::joinable!(set_repo_states -> sets (set_id));

diesel::allow_tables_to_appear_in_same_query!(repo_states, sets, set_repo_states,);
