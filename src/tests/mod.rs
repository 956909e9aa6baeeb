// Integration tests over temp workspaces

mod end_to_end;
