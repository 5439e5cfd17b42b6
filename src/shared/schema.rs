diesel::table! {
    support_tickets (id) {
        id -> Uuid,
        merchant_id -> Varchar,
        status -> Varchar,
        priority -> Varchar,
        assigned_admin_id -> Nullable<Uuid>,
        escalated -> Bool,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    ticket_messages (id) {
        id -> Uuid,
        ticket_id -> Uuid,
        sender -> Varchar,
        content -> Text,
        created_at -> Timestamptz,
    }
}

diesel::joinable!(ticket_messages -> support_tickets (ticket_id));
diesel::allow_tables_to_appear_in_same_query!(support_tickets, ticket_messages);
